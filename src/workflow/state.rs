// SPDX-License-Identifier: MIT

//! Workflow state threaded through one run.
//!
//! The state is a closed struct: every field a step may touch is declared
//! here, and steps hand changes back as a [`StateDelta`] that the engine
//! merges centrally. A forgotten field is a compile error, not a silently
//! dropped update.

use crate::capability::store::{Row, SchemaDescriptor, StoreId};
use crate::capability::tools::{ToolCall, ToolDescriptor, ToolResult};
use crate::workflow::error::ErrorKind;
use std::collections::HashMap;

/// Which search strategy produced the current query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryKind {
    #[default]
    Initial,
    WiderSearch,
}

/// The three step-owned error slots plus the tool slot. A step either
/// clears or sets its own slot; it never leaves it stale.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlots {
    pub validation: Option<String>,
    pub execution: Option<String>,
    pub generation: Option<String>,
    pub tool: Option<String>,
}

impl ErrorSlots {
    pub fn any(&self) -> bool {
        self.validation.is_some()
            || self.execution.is_some()
            || self.generation.is_some()
            || self.tool.is_some()
    }

    pub fn set(&mut self, kind: ErrorKind, detail: String) {
        *self.slot_mut(kind) = Some(detail);
    }

    pub fn clear_kind(&mut self, kind: ErrorKind) {
        *self.slot_mut(kind) = None;
    }

    pub fn clear(&mut self) {
        self.validation = None;
        self.execution = None;
        self.generation = None;
        self.tool = None;
    }

    fn slot_mut(&mut self, kind: ErrorKind) -> &mut Option<String> {
        match kind {
            ErrorKind::Validation => &mut self.validation,
            ErrorKind::Execution => &mut self.execution,
            ErrorKind::Generation => &mut self.generation,
            ErrorKind::Tool => &mut self.tool,
        }
    }

    /// Concatenate every outstanding error, prefixed by kind, for
    /// refinement context. Refinement always consumes the union, never one
    /// kind at a time.
    pub fn combined_context(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(v) = &self.validation {
            parts.push(format!("validation error: {v}"));
        }
        if let Some(e) = &self.execution {
            parts.push(format!("execution error: {e}"));
        }
        if let Some(g) = &self.generation {
            parts.push(format!("generation error: {g}"));
        }
        if let Some(t) = &self.tool {
            parts.push(format!("tool error: {t}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

/// Context threaded through one run. Created per request, discarded at
/// termination; owns no resources needing explicit release.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    /// The natural-language request; immutable for the whole run
    pub request: String,

    // Resolved once by ResolveSchema, read-only after
    pub schema_by_store: HashMap<StoreId, SchemaDescriptor>,
    pub table_to_store: HashMap<String, StoreId>,
    pub table_to_display_name: HashMap<String, String>,

    pub current_query: Option<String>,
    pub query_kind: QueryKind,
    /// Every query ever proposed this run; strictly append-only
    pub query_history: Vec<String>,

    // Replaced wholesale, never merged, on each execution
    pub results_by_store: HashMap<StoreId, Vec<Row>>,
    pub combined_results: Vec<Row>,

    pub errors: ErrorSlots,
    /// Shared across every retryable error kind; bumped once per
    /// refinement/retry transition
    pub attempt_count: u32,

    pub discovered_tools: Vec<ToolDescriptor>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub use_tool_results: bool,

    pub response_prompt: Option<String>,
    /// Set exactly once, by a terminal step
    pub final_response: Option<String>,
}

impl WorkflowState {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Self::default()
        }
    }

    pub fn has_results(&self) -> bool {
        !self.combined_results.is_empty()
    }

    /// Render every resolved schema for model prompts.
    pub fn schema_context(&self) -> String {
        let mut stores: Vec<&StoreId> = self.schema_by_store.keys().collect();
        stores.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        stores
            .iter()
            .map(|store| format!("store {}:\n{}", store, self.schema_by_store[store].describe()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Merge a step's delta. Ordering matters: a proposed query lands in the
    /// history before anything else reads it, and results are replaced as a
    /// unit.
    pub fn apply(&mut self, delta: StateDelta) {
        if let Some(resolved) = delta.schema {
            self.schema_by_store = resolved.schema_by_store;
            self.table_to_store = resolved.table_to_store;
            self.table_to_display_name = resolved.table_to_display_name;
        }

        if let Some((query, kind)) = delta.proposed_query {
            self.current_query = Some(query.clone());
            self.query_kind = kind;
            self.query_history.push(query);
        }

        if let Some(execution) = delta.execution {
            self.results_by_store = execution.results_by_store;
            self.combined_results = execution.combined;
        }

        if let Some(tools) = delta.discovered_tools {
            self.discovered_tools = tools;
        }
        if let Some(calls) = delta.tool_calls {
            self.tool_calls = calls;
        }
        if let Some(results) = delta.tool_results {
            self.tool_results.extend(results);
        }
        if let Some(flag) = delta.use_tool_results {
            self.use_tool_results = flag;
        }

        if let Some(prompt) = delta.response_prompt {
            self.response_prompt = Some(prompt);
        }

        if let Some(response) = delta.final_response {
            if self.final_response.is_some() {
                log::error!("final response already set; ignoring second write");
            } else {
                self.final_response = Some(response);
            }
        }
    }
}

/// Schema maps produced by ResolveSchema.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSchema {
    pub schema_by_store: HashMap<StoreId, SchemaDescriptor>,
    pub table_to_store: HashMap<String, StoreId>,
    pub table_to_display_name: HashMap<String, String>,
}

/// Result set produced by an execution step; replaces prior results.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub results_by_store: HashMap<StoreId, Vec<Row>>,
    pub combined: Vec<Row>,
}

/// What one step wants changed. Merged centrally by the engine.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub schema: Option<ResolvedSchema>,
    pub proposed_query: Option<(String, QueryKind)>,
    pub execution: Option<ExecutionOutcome>,
    pub discovered_tools: Option<Vec<ToolDescriptor>>,
    /// Replaces pending calls
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Appended to accumulated tool results
    pub tool_results: Option<Vec<ToolResult>>,
    pub use_tool_results: Option<bool>,
    pub response_prompt: Option<String>,
    pub final_response: Option<String>,
}
