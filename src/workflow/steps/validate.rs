// SPDX-License-Identifier: MIT

//! ValidateQuery and SecurityRecheck: both stages of the validator run
//! before every execution, including after each refinement.

use crate::workflow::config::RunConfig;
use crate::workflow::engine::Collaborators;
use crate::workflow::error::ErrorKind;
use crate::workflow::state::WorkflowState;
use crate::workflow::step::StepOutcome;
use crate::workflow::validator::{Validator, Verdict};

pub(super) async fn validate_query(
    state: &WorkflowState,
    ctx: &Collaborators,
    config: &RunConfig,
) -> StepOutcome {
    // A missing query lands in this step's own slot so the failure has a
    // defined transition back through refinement
    let query = match &state.current_query {
        Some(query) => query,
        None => {
            return StepOutcome::Failed(
                ErrorKind::Validation,
                "no query available to validate".to_string(),
            );
        }
    };

    let validator = Validator::new(
        ctx.invoker.clone(),
        config.enable_security_analysis,
        config.allow_unsafe_queries,
    );

    match validator.validate(query, &state.schema_context()).await {
        Verdict::Safe => StepOutcome::ok(),
        Verdict::Unsafe(reason) => {
            log::warn!("query rejected: {reason}");
            StepOutcome::Failed(ErrorKind::Validation, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::invoker::{
        InvokerKind, InvokerOutput, InvokerRequest, LanguageModelInvoker,
    };
    use crate::capability::store::{QueryExecutor, Row, SchemaDescriptor, SchemaProvider, StoreId};
    use crate::capability::tools::{ToolDescriptor, ToolResult, ToolServiceRegistry};
    use async_trait::async_trait;
    use std::error::Error;
    use std::sync::Arc;

    // Stage 2 is off by default, so none of the collaborators are touched
    struct Unused;

    #[async_trait]
    impl LanguageModelInvoker for Unused {
        async fn generate(
            &self,
            _kind: InvokerKind,
            _request: &InvokerRequest,
        ) -> Result<InvokerOutput, Box<dyn Error + Send + Sync>> {
            Err("not expected".into())
        }
    }

    #[async_trait]
    impl SchemaProvider for Unused {
        async fn get_schema(
            &self,
            _store: &StoreId,
        ) -> Result<SchemaDescriptor, Box<dyn Error + Send + Sync>> {
            Err("not expected".into())
        }
    }

    #[async_trait]
    impl QueryExecutor for Unused {
        async fn execute(
            &self,
            _query: &str,
            _store: &StoreId,
        ) -> Result<Vec<Row>, Box<dyn Error + Send + Sync>> {
            Err("not expected".into())
        }

        async fn list_stores(&self) -> Result<Vec<StoreId>, Box<dyn Error + Send + Sync>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl ToolServiceRegistry for Unused {
        async fn discover(&self) -> Result<Vec<ToolDescriptor>, Box<dyn Error + Send + Sync>> {
            Ok(Vec::new())
        }

        async fn invoke(
            &self,
            _descriptor: &ToolDescriptor,
            _args: serde_json::Value,
        ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
            Err("not expected".into())
        }
    }

    fn ctx() -> Collaborators {
        let unused = Arc::new(Unused);
        Collaborators {
            invoker: unused.clone(),
            executor: unused.clone(),
            schemas: unused.clone(),
            tools: unused,
        }
    }

    #[tokio::test]
    async fn test_missing_query_lands_in_validation_slot() {
        let state = WorkflowState::new("list customers");
        match validate_query(&state, &ctx(), &RunConfig::default()).await {
            StepOutcome::Failed(kind, detail) => {
                assert_eq!(kind, ErrorKind::Validation);
                assert!(detail.contains("no query"));
            }
            StepOutcome::Ok(_) => panic!("expected Failed"),
        }
    }

    #[tokio::test]
    async fn test_rejected_query_lands_in_validation_slot() {
        let mut state = WorkflowState::new("q");
        state.current_query = Some("DROP TABLE customers".to_string());
        match validate_query(&state, &ctx(), &RunConfig::default()).await {
            StepOutcome::Failed(kind, reason) => {
                assert_eq!(kind, ErrorKind::Validation);
                assert!(reason.contains("drop"));
            }
            StepOutcome::Ok(_) => panic!("expected Failed"),
        }
    }
}
