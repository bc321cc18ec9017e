// SPDX-License-Identifier: MIT

//! Query generation, refinement, and the wider-search strategist.
//!
//! All three receive the entire query history, never a summary. Omitting
//! history risks oscillation between two failing alternatives, so this is a
//! correctness requirement.

use crate::capability::invoker::{InvokerKind, InvokerRequest};
use crate::workflow::engine::Collaborators;
use crate::workflow::error::ErrorKind;
use crate::workflow::state::{QueryKind, StateDelta, WorkflowState};
use crate::workflow::step::StepOutcome;

/// Fixed best-effort message used when wider search cannot even propose an
/// alternative, and as the last-resort response body.
pub const NO_RESULTS_MESSAGE: &str =
    "No results were found for your request. Try rephrasing the question or broadening its scope.";

/// Strip markdown code fences the model sometimes wraps queries in.
fn clean_query(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
        .to_string()
}

fn base_request(state: &WorkflowState) -> InvokerRequest {
    InvokerRequest {
        request: state.request.clone(),
        schema_context: Some(state.schema_context()),
        query_history: state.query_history.clone(),
        error_context: state.errors.combined_context(),
        result_context: None,
        tool_context: None,
    }
}

pub(super) async fn generate_query(state: &WorkflowState, ctx: &Collaborators) -> StepOutcome {
    let request = base_request(state);

    match ctx
        .invoker
        .generate(InvokerKind::QueryGeneration, &request)
        .await
    {
        Ok(output) => {
            let query = clean_query(&output.into_text());
            if query.is_empty() {
                return StepOutcome::Failed(
                    ErrorKind::Generation,
                    "model returned an empty query".to_string(),
                );
            }
            log::info!("generated query: {query}");
            StepOutcome::Ok(StateDelta {
                proposed_query: Some((query, QueryKind::Initial)),
                ..Default::default()
            })
        }
        Err(e) => StepOutcome::Failed(ErrorKind::Generation, format!("query generation failed: {e}")),
    }
}

/// Refinement consumes the union of every outstanding error, prefixed by
/// kind, in one context string. The engine pre-clears the slots afterward so
/// subsequent steps repopulate only what still fails.
pub(super) async fn refine_query(state: &WorkflowState, ctx: &Collaborators) -> StepOutcome {
    let request = base_request(state);
    log::info!(
        "refining query (attempt {}), error context: {}",
        state.attempt_count,
        request.error_context.as_deref().unwrap_or("none")
    );

    match ctx
        .invoker
        .generate(InvokerKind::QueryRefinement, &request)
        .await
    {
        Ok(output) => {
            let query = clean_query(&output.into_text());
            if query.is_empty() {
                return StepOutcome::Failed(
                    ErrorKind::Generation,
                    "model returned an empty refinement".to_string(),
                );
            }
            StepOutcome::Ok(StateDelta {
                // Refinement keeps the current search strategy
                proposed_query: Some((query, state.query_kind)),
                ..Default::default()
            })
        }
        Err(e) => StepOutcome::Failed(ErrorKind::Generation, format!("query refinement failed: {e}")),
    }
}

/// The wider-search strategist. A generator fault here short-circuits to the
/// fixed no-results response rather than another refinement cycle.
pub(super) async fn generate_wider_search_query(
    state: &WorkflowState,
    ctx: &Collaborators,
) -> StepOutcome {
    let request = base_request(state);
    log::info!(
        "no rows yet; proposing wider-search query (attempt {})",
        state.attempt_count
    );

    match ctx.invoker.generate(InvokerKind::WiderSearch, &request).await {
        Ok(output) => {
            let query = clean_query(&output.into_text());
            if query.is_empty() {
                log::warn!("wider-search generator returned nothing; giving up");
                return StepOutcome::Ok(StateDelta {
                    final_response: Some(NO_RESULTS_MESSAGE.to_string()),
                    ..Default::default()
                });
            }
            StepOutcome::Ok(StateDelta {
                proposed_query: Some((query, QueryKind::WiderSearch)),
                ..Default::default()
            })
        }
        Err(e) => {
            log::warn!("wider-search generation failed ({e}); giving up");
            StepOutcome::Ok(StateDelta {
                final_response: Some(NO_RESULTS_MESSAGE.to_string()),
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_query_strips_fences() {
        assert_eq!(
            clean_query("```sql\nSELECT * FROM t\n```"),
            "SELECT * FROM t"
        );
        assert_eq!(clean_query("```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(clean_query("  SELECT 2  "), "SELECT 2");
    }

    #[test]
    fn test_base_request_carries_full_history() {
        let mut state = WorkflowState::new("list customers");
        state.query_history = vec!["SELECT a".to_string(), "SELECT b".to_string()];

        let request = base_request(&state);
        assert_eq!(request.query_history.len(), 2);
        assert_eq!(request.request, "list customers");
    }
}
