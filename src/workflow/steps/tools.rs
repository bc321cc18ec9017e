// SPDX-License-Identifier: MIT

//! Tool routing steps: discovery, the raw tool-only terminal path, and the
//! feed-results-back-to-the-model loop.

use super::{ensure_live, respond::render_tool_results};
use crate::capability::invoker::{InvokerKind, InvokerOutput, InvokerRequest};
use crate::capability::tools::{ToolCall, ToolDescriptor, ToolResult};
use crate::workflow::config::RunConfig;
use crate::workflow::engine::Collaborators;
use crate::workflow::error::{ErrorKind, WorkflowError};
use crate::workflow::state::{StateDelta, WorkflowState};
use crate::workflow::step::StepOutcome;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Structured output of the tool-call-synthesis invoker kind.
#[derive(Debug, Deserialize, Default)]
struct ToolPlan {
    #[serde(default)]
    calls: Vec<ToolCall>,
    /// Model wants to see the tool results before query generation
    #[serde(default)]
    route_to_model: bool,
}

fn parse_plan(output: &InvokerOutput) -> Result<ToolPlan, serde_json::Error> {
    match output {
        InvokerOutput::Structured(v) => serde_json::from_value(v.clone()),
        InvokerOutput::Text(t) => serde_json::from_str(t.trim()),
    }
}

fn descriptor_context(tools: &[ToolDescriptor]) -> String {
    tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run the planned calls. A failed call becomes an error-shaped result
/// rather than failing the step; the model can still reason about it.
async fn run_calls(
    calls: &[ToolCall],
    state: &WorkflowState,
    ctx: &Collaborators,
    cancel: &CancellationToken,
) -> Result<Vec<ToolResult>, WorkflowError> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        ensure_live(cancel)?;
        let descriptor = state
            .discovered_tools
            .iter()
            .find(|d| d.name == call.tool)
            .cloned()
            .unwrap_or_else(|| ToolDescriptor {
                name: call.tool.clone(),
                description: String::new(),
                schema: json!({}),
            });

        match ctx.tools.invoke(&descriptor, call.args.clone()).await {
            Ok(result) => results.push(result),
            Err(e) => {
                log::warn!("tool {} failed: {e}", call.tool);
                results.push(ToolResult {
                    tool: call.tool.clone(),
                    output: json!({"error": e.to_string()}),
                });
            }
        }
    }
    Ok(results)
}

pub(super) async fn discover_tools(
    state: &WorkflowState,
    ctx: &Collaborators,
    config: &RunConfig,
    cancel: &CancellationToken,
) -> Result<StepOutcome, WorkflowError> {
    ensure_live(cancel)?;
    let discovered = match ctx.tools.discover().await {
        Ok(tools) => tools,
        Err(e) => {
            return Ok(StepOutcome::Failed(
                ErrorKind::Tool,
                format!("tool discovery failed: {e}"),
            ));
        }
    };

    if discovered.is_empty() {
        return Ok(StepOutcome::Ok(StateDelta {
            discovered_tools: Some(Vec::new()),
            ..Default::default()
        }));
    }

    log::info!("discovered {} tool services", discovered.len());

    let request = InvokerRequest {
        request: state.request.clone(),
        tool_context: Some(descriptor_context(&discovered)),
        ..InvokerRequest::default()
    };

    ensure_live(cancel)?;
    let plan = match ctx
        .invoker
        .generate(InvokerKind::ToolCallSynthesis, &request)
        .await
    {
        Ok(output) => match parse_plan(&output) {
            Ok(plan) => plan,
            Err(e) => {
                log::warn!("unparseable tool plan ({e}); proceeding without tools");
                ToolPlan::default()
            }
        },
        Err(e) => {
            return Ok(StepOutcome::Failed(
                ErrorKind::Tool,
                format!("tool call synthesis failed: {e}"),
            ));
        }
    };

    // With stores disabled, calls stay pending: ExecuteToolsAndReturn runs
    // them so their output lands directly in the final response.
    let mut delta = StateDelta {
        discovered_tools: Some(discovered.clone()),
        tool_calls: Some(plan.calls.clone()),
        ..Default::default()
    };

    if !plan.calls.is_empty() && !config.skip_store_operations {
        let state_with_tools = {
            let mut s = state.clone();
            s.discovered_tools = discovered;
            s
        };
        let results = run_calls(&plan.calls, &state_with_tools, ctx, cancel).await?;
        delta.use_tool_results = Some(plan.route_to_model && !results.is_empty());
        delta.tool_results = Some(results);
        delta.tool_calls = Some(Vec::new());
    }

    Ok(StepOutcome::Ok(delta))
}

/// Terminal tool path: run anything still pending and return the rendered
/// tool results as the final response.
pub(super) async fn execute_tools_and_return(
    state: &WorkflowState,
    ctx: &Collaborators,
    cancel: &CancellationToken,
) -> Result<StepOutcome, WorkflowError> {
    let mut results = state.tool_results.clone();
    if !state.tool_calls.is_empty() {
        results.extend(run_calls(&state.tool_calls, state, ctx, cancel).await?);
    }

    let body = if results.is_empty() {
        "No tool produced output for this request.".to_string()
    } else {
        render_tool_results(&results)
    };

    Ok(StepOutcome::Ok(StateDelta {
        tool_calls: Some(Vec::new()),
        final_response: Some(body),
        ..Default::default()
    }))
}

/// Hand accumulated tool results to the model, which may request follow-up
/// calls before the response prompt is built.
pub(super) async fn return_tool_results_to_model(
    state: &WorkflowState,
    ctx: &Collaborators,
) -> StepOutcome {
    let request = InvokerRequest {
        request: state.request.clone(),
        tool_context: Some(render_tool_results(&state.tool_results)),
        ..InvokerRequest::default()
    };

    match ctx
        .invoker
        .generate(InvokerKind::ToolCallSynthesis, &request)
        .await
    {
        Ok(output) => {
            let plan = parse_plan(&output).unwrap_or_default();
            StepOutcome::Ok(StateDelta {
                tool_calls: Some(plan.calls),
                use_tool_results: Some(true),
                ..Default::default()
            })
        }
        Err(e) => StepOutcome::Failed(
            ErrorKind::Tool,
            format!("returning tool results to model failed: {e}"),
        ),
    }
}

/// Run any follow-up calls the model requested, then fall through to prompt
/// generation.
pub(super) async fn await_tool_response(
    state: &WorkflowState,
    ctx: &Collaborators,
    cancel: &CancellationToken,
) -> Result<StepOutcome, WorkflowError> {
    let mut delta = StateDelta {
        tool_calls: Some(Vec::new()),
        ..Default::default()
    };

    if !state.tool_calls.is_empty() {
        let results = run_calls(&state.tool_calls, state, ctx, cancel).await?;
        delta.tool_results = Some(results);
    }

    Ok(StepOutcome::Ok(delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_from_structured() {
        let output = InvokerOutput::Structured(json!({
            "calls": [{"tool": "weather", "args": {"city": "Oslo"}}],
            "route_to_model": true
        }));
        let plan = parse_plan(&output).unwrap();
        assert_eq!(plan.calls.len(), 1);
        assert_eq!(plan.calls[0].tool, "weather");
        assert!(plan.route_to_model);
    }

    #[test]
    fn test_parse_plan_defaults() {
        let output = InvokerOutput::Text(r#"{"calls": []}"#.to_string());
        let plan = parse_plan(&output).unwrap();
        assert!(plan.calls.is_empty());
        assert!(!plan.route_to_model);
    }

    #[test]
    fn test_descriptor_context_lists_tools() {
        let tools = vec![
            ToolDescriptor {
                name: "weather".to_string(),
                description: "current weather".to_string(),
                schema: json!({}),
            },
            ToolDescriptor {
                name: "fx".to_string(),
                description: "exchange rates".to_string(),
                schema: json!({}),
            },
        ];
        let context = descriptor_context(&tools);
        assert!(context.contains("- weather: current weather"));
        assert!(context.contains("- fx: exchange rates"));
    }
}
