// SPDX-License-Identifier: MIT

//! In-memory store backed by a YAML fixture, for local runs.
//!
//! The executor is deliberately naive: it returns the rows of the first
//! fixture table referenced by the query. It exists so the workflow can be
//! exercised end to end without a real database behind it.

use super::store::{
    ColumnDescriptor, QueryExecutor, Row, SchemaDescriptor, SchemaProvider, StoreId,
    TableDescriptor,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct FixtureFile {
    pub stores: HashMap<String, FixtureStoreDef>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureStoreDef {
    pub tables: HashMap<String, FixtureTableDef>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureTableDef {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

pub struct FixtureStore {
    stores: HashMap<StoreId, FixtureStoreDef>,
}

impl FixtureStore {
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let text = std::fs::read_to_string(path)?;
        let file: FixtureFile = serde_yaml::from_str(&text)?;
        Ok(Self {
            stores: file
                .stores
                .into_iter()
                .map(|(k, v)| (StoreId::new(k), v))
                .collect(),
        })
    }
}

#[async_trait]
impl SchemaProvider for FixtureStore {
    async fn get_schema(
        &self,
        store: &StoreId,
    ) -> Result<SchemaDescriptor, Box<dyn Error + Send + Sync>> {
        let def = self
            .stores
            .get(store)
            .ok_or_else(|| format!("unknown store: {store}"))?;

        Ok(SchemaDescriptor {
            tables: def
                .tables
                .iter()
                .map(|(name, t)| TableDescriptor {
                    name: name.clone(),
                    display_name: t.display_name.clone(),
                    columns: t.columns.clone(),
                })
                .collect(),
        })
    }
}

#[async_trait]
impl QueryExecutor for FixtureStore {
    async fn execute(
        &self,
        query: &str,
        store: &StoreId,
    ) -> Result<Vec<Row>, Box<dyn Error + Send + Sync>> {
        let def = self
            .stores
            .get(store)
            .ok_or_else(|| format!("unknown store: {store}"))?;

        let lowered = query.to_lowercase();
        for (name, table) in &def.tables {
            if lowered.contains(&name.to_lowercase()) {
                return Ok(table.rows.clone());
            }
        }

        Err(format!("query references no table known to store {store}").into())
    }

    async fn list_stores(&self) -> Result<Vec<StoreId>, Box<dyn Error + Send + Sync>> {
        let mut ids: Vec<StoreId> = self.stores.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
stores:
  db1:
    tables:
      customers:
        display_name: Customers
        columns:
          - name: id
            data_type: integer
          - name: name
            data_type: text
        rows:
          - id: 1
            name: Alice
          - id: 2
            name: Bob
"#;

    fn load() -> FixtureStore {
        let file: FixtureFile = serde_yaml::from_str(FIXTURE).unwrap();
        FixtureStore {
            stores: file
                .stores
                .into_iter()
                .map(|(k, v)| (StoreId::new(k), v))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_schema_reports_fixture_tables() {
        let store = load();
        let schema = store.get_schema(&StoreId::from("db1")).await.unwrap();
        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.tables[0].name, "customers");
        assert_eq!(schema.tables[0].display_name.as_deref(), Some("Customers"));
    }

    #[tokio::test]
    async fn test_execute_returns_rows_of_referenced_table() {
        let store = load();
        let rows = store
            .execute("SELECT * FROM customers", &StoreId::from("db1"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Alice");
    }

    #[tokio::test]
    async fn test_execute_unknown_table_fails() {
        let store = load();
        let result = store
            .execute("SELECT * FROM invoices", &StoreId::from("db1"))
            .await;
        assert!(result.is_err());
    }
}
