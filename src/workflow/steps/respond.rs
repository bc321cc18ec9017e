// SPDX-License-Identifier: MIT

//! GeneratePrompt / GenerateResponse / FormatRawResults.
//!
//! The terminal tail never fails: every fault on the way out degrades to a
//! deterministic rendering, so ceiling exhaustion and late invoker faults
//! still produce a clearly marked best-effort message instead of a raw error.

use super::generate::NO_RESULTS_MESSAGE;
use crate::capability::store::Row;
use crate::capability::tools::ToolResult;
use crate::capability::invoker::{InvokerKind, InvokerRequest};
use crate::workflow::config::RunConfig;
use crate::workflow::engine::Collaborators;
use crate::workflow::state::{StateDelta, WorkflowState};
use crate::workflow::step::StepOutcome;

/// Render rows as readable text, one row per line.
pub fn render_rows(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => format!("{k}: {s}"),
                    other => format!("{k}: {other}"),
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_tool_results(results: &[ToolResult]) -> String {
    results
        .iter()
        .map(|r| format!("{}:\n{}", r.tool, serde_json::to_string_pretty(&r.output).unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Deterministic prompt used when prompt synthesis is disabled or fails.
fn built_in_prompt(state: &WorkflowState) -> String {
    let mut sections = vec![format!(
        "Answer the following request using only the material below.\n\nRequest: {}",
        state.request
    )];

    if state.has_results() {
        sections.push(format!("Query results:\n{}", render_rows(&state.combined_results)));
    } else {
        sections.push("The query returned no rows.".to_string());
    }

    if !state.tool_results.is_empty() {
        sections.push(format!(
            "Tool results:\n{}",
            render_tool_results(&state.tool_results)
        ));
    }

    if let Some(errors) = state.errors.combined_context() {
        sections.push(format!(
            "The run hit problems it could not recover from; acknowledge the answer \
             is best-effort.\n{errors}"
        ));
    }

    sections.join("\n\n")
}

pub(super) async fn generate_prompt(
    state: &WorkflowState,
    ctx: &Collaborators,
    config: &RunConfig,
) -> StepOutcome {
    if config.disable_prompt_generation || config.disable_response_generation {
        return StepOutcome::Ok(StateDelta {
            response_prompt: Some(built_in_prompt(state)),
            ..Default::default()
        });
    }

    let request = InvokerRequest {
        request: state.request.clone(),
        schema_context: None,
        query_history: Vec::new(),
        error_context: state.errors.combined_context(),
        result_context: Some(render_rows(&state.combined_results)),
        tool_context: if state.tool_results.is_empty() {
            None
        } else {
            Some(render_tool_results(&state.tool_results))
        },
    };

    let prompt = match ctx
        .invoker
        .generate(InvokerKind::PromptSynthesis, &request)
        .await
    {
        Ok(output) => output.into_text(),
        Err(e) => {
            log::warn!("prompt synthesis failed ({e}); using built-in prompt");
            built_in_prompt(state)
        }
    };

    StepOutcome::Ok(StateDelta {
        response_prompt: Some(prompt),
        ..Default::default()
    })
}

pub(super) async fn generate_response(state: &WorkflowState, ctx: &Collaborators) -> StepOutcome {
    let prompt = state
        .response_prompt
        .clone()
        .unwrap_or_else(|| built_in_prompt(state));

    let request = InvokerRequest::for_request(prompt);

    let response = match ctx
        .invoker
        .generate(InvokerKind::ResponseSynthesis, &request)
        .await
    {
        Ok(output) => output.into_text(),
        Err(e) => {
            log::warn!("response synthesis failed ({e}); falling back to raw rendering");
            best_effort_body(state)
        }
    };

    StepOutcome::Ok(StateDelta {
        final_response: Some(response),
        ..Default::default()
    })
}

pub(super) fn format_raw_results(state: &WorkflowState) -> StepOutcome {
    let body = if state.has_results() {
        render_rows(&state.combined_results)
    } else if !state.tool_results.is_empty() {
        render_tool_results(&state.tool_results)
    } else {
        NO_RESULTS_MESSAGE.to_string()
    };

    StepOutcome::Ok(StateDelta {
        final_response: Some(body),
        ..Default::default()
    })
}

fn best_effort_body(state: &WorkflowState) -> String {
    if state.has_results() {
        format!(
            "Best-effort answer (response generation unavailable). Raw results:\n{}",
            render_rows(&state.combined_results)
        )
    } else {
        NO_RESULTS_MESSAGE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_render_rows_empty() {
        assert_eq!(render_rows(&[]), "(no rows)");
    }

    #[test]
    fn test_render_rows_formats_columns() {
        let rows = vec![row(json!({"id": 1, "name": "Alice"}))];
        let text = render_rows(&rows);
        assert!(text.contains("id: 1"));
        assert!(text.contains("name: Alice"));
    }

    #[test]
    fn test_built_in_prompt_mentions_missing_rows() {
        let state = WorkflowState::new("list customers");
        let prompt = built_in_prompt(&state);
        assert!(prompt.contains("Request: list customers"));
        assert!(prompt.contains("no rows"));
    }

    #[test]
    fn test_built_in_prompt_flags_best_effort_on_errors() {
        let mut state = WorkflowState::new("list customers");
        state
            .errors
            .set(crate::workflow::error::ErrorKind::Execution, "boom".to_string());
        let prompt = built_in_prompt(&state);
        assert!(prompt.contains("best-effort"));
        assert!(prompt.contains("boom"));
    }

    #[test]
    fn test_format_raw_results_prefers_rows() {
        let mut state = WorkflowState::new("q");
        state.combined_results = vec![row(json!({"id": 7}))];
        match format_raw_results(&state) {
            StepOutcome::Ok(delta) => {
                assert!(delta.final_response.unwrap().contains("id: 7"));
            }
            StepOutcome::Failed(..) => panic!("raw formatting never fails"),
        }
    }

    #[test]
    fn test_format_raw_results_without_anything_uses_fixed_message() {
        let state = WorkflowState::new("q");
        match format_raw_results(&state) {
            StepOutcome::Ok(delta) => {
                assert_eq!(delta.final_response.as_deref(), Some(NO_RESULTS_MESSAGE));
            }
            StepOutcome::Failed(..) => panic!("raw formatting never fails"),
        }
    }
}
