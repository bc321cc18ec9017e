// SPDX-License-Identifier: MIT

//! ResolveSchema: fetch every store's schema and build the lookup maps.

use super::ensure_live;
use crate::workflow::config::RunConfig;
use crate::workflow::engine::Collaborators;
use crate::workflow::error::{ErrorKind, WorkflowError};
use crate::workflow::state::{ResolvedSchema, StateDelta, WorkflowState};
use crate::workflow::step::StepOutcome;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

pub(super) async fn resolve_schema(
    _state: &WorkflowState,
    ctx: &Collaborators,
    config: &RunConfig,
    cancel: &CancellationToken,
) -> Result<StepOutcome, WorkflowError> {
    if config.skip_store_operations {
        log::info!("store operations disabled; skipping schema resolution");
        return Ok(StepOutcome::ok());
    }

    ensure_live(cancel)?;
    let stores = match ctx.executor.list_stores().await {
        Ok(stores) => stores,
        Err(e) => {
            return Ok(StepOutcome::Failed(
                ErrorKind::Generation,
                format!("could not list stores: {e}"),
            ));
        }
    };

    // Per-store fetches are independent, not a cross-store join; run them
    // concurrently and merge by store identity.
    ensure_live(cancel)?;
    let fetches = stores.iter().map(|store| async move {
        let schema = ctx.schemas.get_schema(store).await;
        (store.clone(), schema)
    });
    let fetched = join_all(fetches).await;

    let mut resolved = ResolvedSchema::default();
    for (store, result) in fetched {
        let schema = match result {
            Ok(schema) => schema,
            Err(e) => {
                return Ok(StepOutcome::Failed(
                    ErrorKind::Generation,
                    format!("schema resolution failed for store {store}: {e}"),
                ));
            }
        };

        for table in &schema.tables {
            resolved
                .table_to_store
                .insert(table.name.clone(), store.clone());
            if let Some(display) = &table.display_name {
                resolved
                    .table_to_display_name
                    .insert(table.name.clone(), display.clone());
            }
        }
        resolved.schema_by_store.insert(store, schema);
    }

    log::info!(
        "resolved {} tables across {} stores",
        resolved.table_to_store.len(),
        resolved.schema_by_store.len()
    );

    Ok(StepOutcome::Ok(StateDelta {
        schema: Some(resolved),
        ..Default::default()
    }))
}
