// SPDX-License-Identifier: MIT

//! ExecuteQuery / ExecuteWiderSearch: dispatch the current query per store.
//!
//! Store resolution follows `table_to_store`: one referenced store is a
//! plain execute, several referenced stores are one cross-store execution
//! (never per-store fan-out of a join), and a query referencing no known
//! table fans out to every store concurrently, merged by store identity.
//! Row order across stores is not deterministic.

use super::ensure_live;
use crate::capability::store::StoreId;
use crate::workflow::config::RunConfig;
use crate::workflow::engine::Collaborators;
use crate::workflow::error::{ErrorKind, WorkflowError};
use crate::workflow::state::{ExecutionOutcome, StateDelta, WorkflowState};
use crate::workflow::step::StepOutcome;
use futures::future::join_all;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Stores referenced by the query, in first-mention order, deduplicated.
fn referenced_stores(query: &str, state: &WorkflowState) -> Vec<StoreId> {
    let lowered = query.to_lowercase();
    let mut token = String::new();
    let mut tokens = Vec::new();
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            token.push(c);
        } else if !token.is_empty() {
            tokens.push(std::mem::take(&mut token));
        }
    }
    if !token.is_empty() {
        tokens.push(token);
    }

    let mut stores = Vec::new();
    for t in tokens {
        if let Some(store) = state.table_to_store.get(&t) {
            if !stores.contains(store) {
                stores.push(store.clone());
            }
        }
    }
    stores
}

pub(super) async fn execute_query(
    state: &WorkflowState,
    ctx: &Collaborators,
    config: &RunConfig,
    cancel: &CancellationToken,
) -> Result<StepOutcome, WorkflowError> {
    if config.skip_store_operations {
        return Ok(StepOutcome::ok());
    }

    let query = match &state.current_query {
        Some(query) => query.clone(),
        None => {
            return Ok(StepOutcome::Failed(
                ErrorKind::Generation,
                "no query available to execute".to_string(),
            ));
        }
    };

    let stores = referenced_stores(&query, state);
    ensure_live(cancel)?;

    let outcome = match stores.len() {
        1 => {
            let store = &stores[0];
            match ctx.executor.execute(&query, store).await {
                Ok(rows) => ExecutionOutcome {
                    combined: rows.clone(),
                    results_by_store: HashMap::from([(store.clone(), rows)]),
                },
                Err(e) => {
                    return Ok(StepOutcome::Failed(
                        ErrorKind::Execution,
                        format!("execution failed on store {store}: {e}"),
                    ));
                }
            }
        }
        n if n > 1 => {
            log::info!("query spans {n} stores; executing as one cross-store statement");
            match ctx.executor.execute_cross(&query, &stores).await {
                Ok(rows) => ExecutionOutcome {
                    combined: rows.clone(),
                    results_by_store: HashMap::from([(stores[0].clone(), rows)]),
                },
                Err(e) => {
                    return Ok(StepOutcome::Failed(
                        ErrorKind::Execution,
                        format!("cross-store execution failed: {e}"),
                    ));
                }
            }
        }
        _ => {
            // No recognized table; fan out to every store and keep what succeeds.
            let all_stores = match ctx.executor.list_stores().await {
                Ok(stores) => stores,
                Err(e) => {
                    return Ok(StepOutcome::Failed(
                        ErrorKind::Execution,
                        format!("could not list stores: {e}"),
                    ));
                }
            };
            if all_stores.is_empty() {
                return Ok(StepOutcome::Failed(
                    ErrorKind::Execution,
                    "no stores available".to_string(),
                ));
            }

            ensure_live(cancel)?;
            let query_ref = &query;
            let runs = all_stores.iter().map(|store| async move {
                let rows = ctx.executor.execute(query_ref, store).await;
                (store.clone(), rows)
            });
            let finished = join_all(runs).await;

            let mut outcome = ExecutionOutcome::default();
            let mut failures = Vec::new();
            for (store, result) in finished {
                match result {
                    Ok(rows) => {
                        outcome.combined.extend(rows.clone());
                        outcome.results_by_store.insert(store, rows);
                    }
                    Err(e) => failures.push(format!("{store}: {e}")),
                }
            }

            if outcome.results_by_store.is_empty() {
                return Ok(StepOutcome::Failed(
                    ErrorKind::Execution,
                    format!("execution failed on every store: {}", failures.join("; ")),
                ));
            }
            outcome
        }
    };

    log::info!("execution returned {} rows", outcome.combined.len());
    Ok(StepOutcome::Ok(StateDelta {
        execution: Some(outcome),
        ..Default::default()
    }))
}
