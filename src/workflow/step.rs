// SPDX-License-Identifier: MIT

//! Step identifiers and step results.

use super::error::ErrorKind;
use super::state::StateDelta;
use std::fmt;

/// Closed set of workflow steps. The router maps one of these plus the
/// current state to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepId {
    ResolveSchema,
    DiscoverTools,
    GenerateQuery,
    ValidateQuery,
    RefineQuery,
    SecurityRecheck,
    ExecuteQuery,
    GenerateWiderSearchQuery,
    ExecuteWiderSearch,
    GeneratePrompt,
    GenerateResponse,
    FormatRawResults,
    ExecuteToolsAndReturn,
    ReturnToolResultsToModel,
    AwaitToolResponse,
}

impl StepId {
    pub fn name(&self) -> &'static str {
        match self {
            StepId::ResolveSchema => "resolve_schema",
            StepId::DiscoverTools => "discover_tools",
            StepId::GenerateQuery => "generate_query",
            StepId::ValidateQuery => "validate_query",
            StepId::RefineQuery => "refine_query",
            StepId::SecurityRecheck => "security_recheck",
            StepId::ExecuteQuery => "execute_query",
            StepId::GenerateWiderSearchQuery => "generate_wider_search_query",
            StepId::ExecuteWiderSearch => "execute_wider_search",
            StepId::GeneratePrompt => "generate_prompt",
            StepId::GenerateResponse => "generate_response",
            StepId::FormatRawResults => "format_raw_results",
            StepId::ExecuteToolsAndReturn => "execute_tools_and_return",
            StepId::ReturnToolResultsToModel => "return_tool_results_to_model",
            StepId::AwaitToolResponse => "await_tool_response",
        }
    }

    /// Steps that produce the final response and end the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepId::GenerateResponse | StepId::FormatRawResults | StepId::ExecuteToolsAndReturn
        )
    }

    /// A retry transition consumes one shared attempt.
    pub fn counts_as_attempt(&self) -> bool {
        matches!(self, StepId::RefineQuery | StepId::GenerateWiderSearchQuery)
    }

    /// The error slot this step owns: a collaborator fault inside the step
    /// becomes this kind, and success clears it (outside the terminal tail,
    /// which reports outstanding errors instead of owning a slot).
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            StepId::ResolveSchema => ErrorKind::Generation,
            StepId::DiscoverTools
            | StepId::ExecuteToolsAndReturn
            | StepId::ReturnToolResultsToModel
            | StepId::AwaitToolResponse => ErrorKind::Tool,
            StepId::GenerateQuery
            | StepId::RefineQuery
            | StepId::GenerateWiderSearchQuery
            | StepId::GeneratePrompt
            | StepId::GenerateResponse
            | StepId::FormatRawResults => ErrorKind::Generation,
            StepId::ValidateQuery | StepId::SecurityRecheck => ErrorKind::Validation,
            StepId::ExecuteQuery | StepId::ExecuteWiderSearch => ErrorKind::Execution,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a step hands back to the engine.
#[derive(Debug)]
pub enum StepOutcome {
    /// Success; the delta is merged and the step's error slot is cleared
    Ok(StateDelta),
    /// Failure; the detail is written into the slot for `ErrorKind`
    Failed(ErrorKind, String),
}

impl StepOutcome {
    pub fn ok() -> Self {
        StepOutcome::Ok(StateDelta::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_steps() {
        assert!(StepId::GenerateResponse.is_terminal());
        assert!(StepId::FormatRawResults.is_terminal());
        assert!(StepId::ExecuteToolsAndReturn.is_terminal());
        assert!(!StepId::ExecuteQuery.is_terminal());
        assert!(!StepId::RefineQuery.is_terminal());
    }

    #[test]
    fn test_attempt_counting_steps() {
        assert!(StepId::RefineQuery.counts_as_attempt());
        assert!(StepId::GenerateWiderSearchQuery.counts_as_attempt());
        assert!(!StepId::ExecuteQuery.counts_as_attempt());
    }

    #[test]
    fn test_error_kind_ownership() {
        assert_eq!(StepId::ValidateQuery.error_kind(), ErrorKind::Validation);
        assert_eq!(StepId::ExecuteQuery.error_kind(), ErrorKind::Execution);
        assert_eq!(StepId::GenerateQuery.error_kind(), ErrorKind::Generation);
        assert_eq!(StepId::DiscoverTools.error_kind(), ErrorKind::Tool);
    }
}
