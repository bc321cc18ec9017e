// SPDX-License-Identifier: MIT

//! Relational store contracts and the shared schema cache.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Identifier of a single relational store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub String);

impl StoreId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    /// Human-facing name used when rendering results
    pub display_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

/// Schema of one store, as reported by its provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
}

impl SchemaDescriptor {
    /// Render the schema as compact text for model prompts.
    pub fn describe(&self) -> String {
        self.tables
            .iter()
            .map(|t| {
                let cols = t
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.data_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("table {} ({})", t.name, cols)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Resolves the schema of a store.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn get_schema(
        &self,
        store: &StoreId,
    ) -> Result<SchemaDescriptor, Box<dyn Error + Send + Sync>>;
}

/// Executes read queries against one or more stores.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        store: &StoreId,
    ) -> Result<Vec<Row>, Box<dyn Error + Send + Sync>>;

    async fn list_stores(&self) -> Result<Vec<StoreId>, Box<dyn Error + Send + Sync>>;

    /// Execute a query that joins across stores as a single statement.
    ///
    /// The default implementation sends the combined query to the first
    /// referenced store, which acts as the federation entry point.
    async fn execute_cross(
        &self,
        query: &str,
        stores: &[StoreId],
    ) -> Result<Vec<Row>, Box<dyn Error + Send + Sync>> {
        let entry = stores
            .first()
            .ok_or("cross-store execution requires at least one store")?;
        self.execute(query, entry).await
    }
}

/// Read-mostly schema cache shared across runs.
///
/// Entries expire on a TTL or on an explicit invalidation signal, never per
/// run. Concurrent reads are safe; a miss fetches through to the provider.
pub struct SchemaCache {
    provider: Arc<dyn SchemaProvider>,
    ttl: Duration,
    entries: RwLock<HashMap<StoreId, (SchemaDescriptor, Instant)>>,
}

impl SchemaCache {
    pub fn new(provider: Arc<dyn SchemaProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Drop the cached entry for one store.
    pub async fn invalidate(&self, store: &StoreId) {
        self.entries.write().await.remove(store);
    }

    /// Drop every cached entry.
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl SchemaProvider for SchemaCache {
    async fn get_schema(
        &self,
        store: &StoreId,
    ) -> Result<SchemaDescriptor, Box<dyn Error + Send + Sync>> {
        {
            let entries = self.entries.read().await;
            if let Some((schema, fetched_at)) = entries.get(store) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(schema.clone());
                }
            }
        }

        let schema = self.provider.get_schema(store).await?;

        {
            let mut entries = self.entries.write().await;
            entries.insert(store.clone(), (schema.clone(), Instant::now()));
        }

        Ok(schema)
    }
}
