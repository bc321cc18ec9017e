// SPDX-License-Identifier: MIT

//! Step implementations. One async function per [`StepId`]; every function
//! takes the current state read-only and hands changes back as a
//! [`StepOutcome`] for the engine to merge.

mod execute;
mod generate;
mod respond;
mod schema;
mod tools;
mod validate;

pub use generate::NO_RESULTS_MESSAGE;
pub use respond::{render_rows, render_tool_results};

use crate::workflow::config::RunConfig;
use crate::workflow::engine::Collaborators;
use crate::workflow::error::WorkflowError;
use crate::workflow::state::WorkflowState;
use crate::workflow::step::{StepId, StepOutcome};
use tokio_util::sync::CancellationToken;

/// Cancellation is checked before every collaborator call. It is a distinct
/// terminal outcome, never folded into an error slot.
pub(crate) fn ensure_live(cancel: &CancellationToken) -> Result<(), WorkflowError> {
    if cancel.is_cancelled() {
        Err(WorkflowError::Cancelled)
    } else {
        Ok(())
    }
}

pub(crate) async fn execute_step(
    step: StepId,
    state: &WorkflowState,
    ctx: &Collaborators,
    config: &RunConfig,
    cancel: &CancellationToken,
) -> Result<StepOutcome, WorkflowError> {
    ensure_live(cancel)?;

    let outcome = match step {
        StepId::ResolveSchema => schema::resolve_schema(state, ctx, config, cancel).await?,
        StepId::DiscoverTools => tools::discover_tools(state, ctx, config, cancel).await?,
        StepId::GenerateQuery => generate::generate_query(state, ctx).await,
        StepId::ValidateQuery | StepId::SecurityRecheck => {
            validate::validate_query(state, ctx, config).await
        }
        StepId::RefineQuery => generate::refine_query(state, ctx).await,
        StepId::ExecuteQuery | StepId::ExecuteWiderSearch => {
            execute::execute_query(state, ctx, config, cancel).await?
        }
        StepId::GenerateWiderSearchQuery => generate::generate_wider_search_query(state, ctx).await,
        StepId::GeneratePrompt => respond::generate_prompt(state, ctx, config).await,
        StepId::GenerateResponse => respond::generate_response(state, ctx).await,
        StepId::FormatRawResults => respond::format_raw_results(state),
        StepId::ExecuteToolsAndReturn => {
            tools::execute_tools_and_return(state, ctx, cancel).await?
        }
        StepId::ReturnToolResultsToModel => tools::return_tool_results_to_model(state, ctx).await,
        StepId::AwaitToolResponse => tools::await_tool_response(state, ctx, cancel).await?,
    };

    Ok(outcome)
}
