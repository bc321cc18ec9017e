// SPDX-License-Identifier: MIT

//! Pure routing: current step plus post-step state selects the next step.
//!
//! Tie-breaks, in order: a set final response terminates; once the attempt
//! ceiling is reached every retry decision is overridden toward the
//! best-effort terminal path; outstanding errors outrank empty results.
//!
//! Every error-sensitive branch goes through [`has_outstanding_error`].
//! Refinement consumes the union of outstanding errors, so any lingering
//! slot routes through it regardless of which step set it.

use super::config::RunConfig;
use super::state::{QueryKind, WorkflowState};
use super::step::StepId;

/// Any of the four error slots is set.
pub fn has_outstanding_error(state: &WorkflowState) -> bool {
    state.errors.any()
}

/// The shared attempt counter has hit the configured ceiling.
pub fn attempts_exhausted(state: &WorkflowState, config: &RunConfig) -> bool {
    state.attempt_count >= config.iteration_ceiling
}

/// Whether the normal routing decision for `current` would be another
/// refinement or wider-search attempt.
fn wants_retry(current: StepId, state: &WorkflowState) -> bool {
    match current {
        StepId::GenerateQuery
        | StepId::RefineQuery
        | StepId::ValidateQuery
        | StepId::SecurityRecheck => has_outstanding_error(state),
        StepId::ExecuteQuery => {
            has_outstanding_error(state)
                || (!state.has_results() && state.query_kind == QueryKind::Initial)
        }
        StepId::ExecuteWiderSearch => has_outstanding_error(state) || !state.has_results(),
        _ => false,
    }
}

/// Select the next step, or `None` when the run is terminal.
pub fn next_step(current: StepId, state: &WorkflowState, config: &RunConfig) -> Option<StepId> {
    use StepId::*;

    if state.final_response.is_some() {
        return None;
    }

    // Ceiling outranks every other condition once reached.
    if attempts_exhausted(state, config) && wants_retry(current, state) {
        log::warn!(
            "attempt ceiling {} reached after {current}; forcing best-effort response",
            config.iteration_ceiling
        );
        return Some(GeneratePrompt);
    }

    match current {
        ResolveSchema => {
            if has_outstanding_error(state) {
                // Schema resolution failure is terminal: answer with the error context
                Some(GeneratePrompt)
            } else {
                Some(DiscoverTools)
            }
        }

        DiscoverTools => {
            if config.skip_store_operations {
                if !state.tool_calls.is_empty() && state.tool_results.is_empty() {
                    Some(ExecuteToolsAndReturn)
                } else {
                    Some(GeneratePrompt)
                }
            } else if state.use_tool_results && !config.disable_response_generation {
                Some(ReturnToolResultsToModel)
            } else {
                Some(GenerateQuery)
            }
        }

        GenerateQuery => {
            if has_outstanding_error(state) {
                Some(RefineQuery)
            } else {
                Some(ValidateQuery)
            }
        }

        ValidateQuery | SecurityRecheck => {
            if has_outstanding_error(state) {
                Some(RefineQuery)
            } else if state.query_kind == QueryKind::WiderSearch {
                Some(ExecuteWiderSearch)
            } else {
                Some(ExecuteQuery)
            }
        }

        RefineQuery => {
            if has_outstanding_error(state) {
                Some(RefineQuery)
            } else {
                Some(SecurityRecheck)
            }
        }

        ExecuteQuery => {
            if has_outstanding_error(state) {
                // Errors outrank empty results
                Some(RefineQuery)
            } else if !state.has_results() && state.query_kind == QueryKind::Initial {
                Some(GenerateWiderSearchQuery)
            } else {
                Some(GeneratePrompt)
            }
        }

        // Generator failure set the fixed no-results response and was
        // caught by the terminal check above.
        GenerateWiderSearchQuery => Some(ValidateQuery),

        ExecuteWiderSearch => {
            if has_outstanding_error(state) || !state.has_results() {
                Some(GenerateWiderSearchQuery)
            } else {
                Some(GeneratePrompt)
            }
        }

        GeneratePrompt => {
            if config.disable_response_generation {
                // Open-question precedence: skip-generation wins over
                // routing tool results to the model.
                if !state.tool_results.is_empty() || !state.tool_calls.is_empty() {
                    Some(ExecuteToolsAndReturn)
                } else {
                    Some(FormatRawResults)
                }
            } else {
                Some(GenerateResponse)
            }
        }

        ReturnToolResultsToModel => Some(AwaitToolResponse),
        AwaitToolResponse => Some(GeneratePrompt),

        GenerateResponse | FormatRawResults | ExecuteToolsAndReturn => None,
    }
}
