// SPDX-License-Identifier: MIT

//! Tool service registry: externally discoverable capabilities invoked by
//! name. The transport behind a registry is out of scope; the contract here
//! is descriptor-based discovery plus invocation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Descriptor of one discoverable tool service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's arguments
    pub schema: Value,
}

/// A call the model decided to make.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// Output of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub output: Value,
}

#[async_trait]
pub trait ToolServiceRegistry: Send + Sync {
    async fn discover(&self) -> Result<Vec<ToolDescriptor>, Box<dyn Error + Send + Sync>>;

    async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        args: Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;
}

/// A single in-process tool service.
#[async_trait]
pub trait ToolService: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    async fn call(&self, args: Value) -> Result<Value, Box<dyn Error + Send + Sync>>;
}

/// In-process registry over a shared map. Registrations are visible to every
/// clone; concurrent runs share one instance.
#[derive(Clone, Default)]
pub struct StaticToolRegistry {
    services: Arc<RwLock<HashMap<String, Arc<dyn ToolService>>>>,
}

impl StaticToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, service: Arc<dyn ToolService>) {
        let mut services = self.services.write().await;
        services.insert(service.descriptor().name.clone(), service);
    }
}

#[async_trait]
impl ToolServiceRegistry for StaticToolRegistry {
    async fn discover(&self) -> Result<Vec<ToolDescriptor>, Box<dyn Error + Send + Sync>> {
        let services = self.services.read().await;
        Ok(services.values().map(|s| s.descriptor().clone()).collect())
    }

    async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        args: Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let service = {
            let services = self.services.read().await;
            services.get(&descriptor.name).cloned()
        };

        let service =
            service.ok_or_else(|| format!("tool service '{}' not registered", descriptor.name))?;

        let output = service.call(args).await?;
        Ok(ToolResult {
            tool: descriptor.name.clone(),
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use serde_json::json;

    static ECHO_SCHEMA: Lazy<Value> = Lazy::new(|| {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"}
            }
        })
    });

    struct EchoService {
        descriptor: ToolDescriptor,
    }

    impl EchoService {
        fn new(name: &str) -> Self {
            Self {
                descriptor: ToolDescriptor {
                    name: name.to_string(),
                    description: format!("echoes its input ({name})"),
                    schema: ECHO_SCHEMA.clone(),
                },
            }
        }
    }

    #[async_trait]
    impl ToolService for EchoService {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn call(&self, args: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
            Ok(json!({"echo": args}))
        }
    }

    #[tokio::test]
    async fn test_discover_lists_registered_services() {
        let registry = StaticToolRegistry::new();
        registry.register(Arc::new(EchoService::new("echo"))).await;
        registry
            .register(Arc::new(EchoService::new("echo_two")))
            .await;

        let mut names: Vec<String> = registry
            .discover()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["echo".to_string(), "echo_two".to_string()]);
    }

    #[tokio::test]
    async fn test_invoke_round_trips_through_service() {
        let registry = StaticToolRegistry::new();
        let service = EchoService::new("echo");
        let descriptor = service.descriptor().clone();
        registry.register(Arc::new(service)).await;

        let result = registry
            .invoke(&descriptor, json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result.tool, "echo");
        assert_eq!(result.output["echo"]["text"], "hi");
    }

    #[tokio::test]
    async fn test_invoke_unknown_service_fails() {
        let registry = StaticToolRegistry::new();
        let descriptor = ToolDescriptor {
            name: "ghost".to_string(),
            description: String::new(),
            schema: json!({}),
        };

        assert!(registry.invoke(&descriptor, json!({})).await.is_err());
    }
}
