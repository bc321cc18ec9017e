// SPDX-License-Identifier: MIT

//! The workflow engine: executes steps, merges their deltas into state,
//! consults the router after each one, and records a trace.

use super::config::RunConfig;
use super::error::WorkflowError;
use super::router;
use super::state::{ErrorSlots, QueryKind, WorkflowState};
use super::step::{StepId, StepOutcome};
use super::steps;
use crate::capability::invoker::LanguageModelInvoker;
use crate::capability::store::{QueryExecutor, Row, SchemaProvider};
use crate::capability::tools::ToolServiceRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The external collaborators a run talks to. Shared across concurrent
/// runs; the state itself never is.
#[derive(Clone)]
pub struct Collaborators {
    pub invoker: Arc<dyn LanguageModelInvoker>,
    pub executor: Arc<dyn QueryExecutor>,
    pub schemas: Arc<dyn SchemaProvider>,
    pub tools: Arc<dyn ToolServiceRegistry>,
}

/// One executed step in the run trace.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub step: StepId,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: String,
}

/// The externally relevant fields of the terminal state.
#[derive(Debug)]
pub struct RunOutput {
    pub run_id: Uuid,
    pub final_response: String,
    pub generated_query: Option<String>,
    pub results: Vec<Row>,
    pub query_kind: QueryKind,
    pub attempt_count: u32,
    pub errors: ErrorSlots,
    pub trace: Vec<TraceEntry>,
}

pub struct Engine {
    collaborators: Collaborators,
    config: RunConfig,
}

impl Engine {
    pub fn new(collaborators: Collaborators, config: RunConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Drive one request to a terminal step.
    ///
    /// The run is strictly sequential: no step starts before the previous
    /// state merge commits. Cancellation is checked before every step and
    /// before every router consultation and aborts without a partial
    /// response.
    pub async fn run(
        &self,
        request: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, WorkflowError> {
        let run_id = Uuid::new_v4();
        let mut state = WorkflowState::new(request);
        let mut trace: Vec<TraceEntry> = Vec::new();
        let mut current = StepId::ResolveSchema;

        // The attempt ceiling bounds every retry loop; the non-retry tail
        // between two attempts is a short fixed sequence, so total steps
        // are linear in the ceiling. The budget is a backstop against a
        // routing bug, not a control mechanism.
        let step_budget = self.config.iteration_ceiling.saturating_mul(6) + 16;

        log::info!("run {run_id}: {request}");

        for _ in 0..step_budget {
            if cancel.is_cancelled() {
                log::info!("run {run_id} cancelled before {current}");
                return Err(WorkflowError::Cancelled);
            }

            if current.counts_as_attempt() {
                state.attempt_count += 1;
                log::debug!(
                    "run {run_id}: attempt {}/{}",
                    state.attempt_count,
                    self.config.iteration_ceiling
                );
            }

            let started_at = Utc::now();
            let timer = Instant::now();
            let outcome = steps::execute_step(
                current,
                &state,
                &self.collaborators,
                &self.config,
                cancel,
            )
            .await?;

            // Refinement consumed the union of outstanding errors; clear the
            // slots so later steps repopulate only what still fails.
            if current == StepId::RefineQuery {
                state.errors.clear();
            }

            let outcome_label = match outcome {
                StepOutcome::Ok(delta) => {
                    // Outstanding errors survive the terminal tail so the
                    // output still shows what made the answer best-effort.
                    if !(current == StepId::GeneratePrompt || current.is_terminal()) {
                        state.errors.clear_kind(current.error_kind());
                    }
                    state.apply(delta);
                    "ok".to_string()
                }
                StepOutcome::Failed(kind, detail) => {
                    log::warn!("run {run_id}: {current} failed ({kind}): {detail}");
                    state.errors.set(kind, detail);
                    format!("failed: {kind}")
                }
            };

            trace.push(TraceEntry {
                step: current,
                started_at,
                duration_ms: timer.elapsed().as_millis() as u64,
                outcome: outcome_label,
            });

            if cancel.is_cancelled() {
                log::info!("run {run_id} cancelled after {current}");
                return Err(WorkflowError::Cancelled);
            }

            match router::next_step(current, &state, &self.config) {
                Some(next) => current = next,
                None => return Ok(Self::into_output(run_id, state, trace)),
            }
        }

        // Routing bug backstop: close out with the fixed message rather
        // than looping.
        log::error!("run {run_id} exceeded its step budget at {current}");
        if state.final_response.is_none() {
            state.final_response = Some(steps::NO_RESULTS_MESSAGE.to_string());
        }
        Ok(Self::into_output(run_id, state, trace))
    }

    fn into_output(run_id: Uuid, state: WorkflowState, trace: Vec<TraceEntry>) -> RunOutput {
        RunOutput {
            run_id,
            final_response: state
                .final_response
                .unwrap_or_else(|| steps::NO_RESULTS_MESSAGE.to_string()),
            generated_query: state.current_query,
            results: state.combined_results,
            query_kind: state.query_kind,
            attempt_count: state.attempt_count,
            errors: state.errors,
            trace,
        }
    }
}
