// SPDX-License-Identifier: MIT

//! Language model invoker contract shared by every generation-flavoured step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// The flavour of generation being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokerKind {
    QueryGeneration,
    QueryRefinement,
    WiderSearch,
    SecurityAnalysis,
    PromptSynthesis,
    ToolCallSynthesis,
    ResponseSynthesis,
}

impl InvokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvokerKind::QueryGeneration => "query_generation",
            InvokerKind::QueryRefinement => "query_refinement",
            InvokerKind::WiderSearch => "wider_search",
            InvokerKind::SecurityAnalysis => "security_analysis",
            InvokerKind::PromptSynthesis => "prompt_synthesis",
            InvokerKind::ToolCallSynthesis => "tool_call_synthesis",
            InvokerKind::ResponseSynthesis => "response_synthesis",
        }
    }

    /// Kinds whose output is parsed as a JSON document rather than free text.
    pub fn expects_structured_output(&self) -> bool {
        matches!(
            self,
            InvokerKind::SecurityAnalysis | InvokerKind::ToolCallSynthesis
        )
    }
}

/// Context handed to the invoker. Query history is always the full history,
/// never a summary, so failed phrasings stay visible across retries.
#[derive(Debug, Clone, Default)]
pub struct InvokerRequest {
    pub request: String,
    pub schema_context: Option<String>,
    pub query_history: Vec<String>,
    pub error_context: Option<String>,
    pub result_context: Option<String>,
    pub tool_context: Option<String>,
}

impl InvokerRequest {
    pub fn for_request(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Self::default()
        }
    }
}

/// What came back from the model.
#[derive(Debug, Clone)]
pub enum InvokerOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl InvokerOutput {
    pub fn into_text(self) -> String {
        match self {
            InvokerOutput::Text(t) => t,
            InvokerOutput::Structured(v) => v.to_string(),
        }
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            InvokerOutput::Structured(v) => Some(v),
            InvokerOutput::Text(_) => None,
        }
    }
}

/// Core trait for language model backends.
#[async_trait]
pub trait LanguageModelInvoker: Send + Sync {
    async fn generate(
        &self,
        kind: InvokerKind,
        request: &InvokerRequest,
    ) -> Result<InvokerOutput, Box<dyn Error + Send + Sync>>;
}

/// Structured verdict returned by the security-analysis invoker kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityReport {
    pub safe: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl SecurityReport {
    /// Parse a report from invoker output, accepting either a structured
    /// value or a JSON document embedded in text.
    pub fn from_output(output: &InvokerOutput) -> Result<Self, serde_json::Error> {
        match output {
            InvokerOutput::Structured(v) => serde_json::from_value(v.clone()),
            InvokerOutput::Text(t) => serde_json::from_str(t.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(InvokerKind::QueryGeneration.as_str(), "query_generation");
        assert_eq!(InvokerKind::SecurityAnalysis.as_str(), "security_analysis");
    }

    #[test]
    fn test_structured_kinds() {
        assert!(InvokerKind::SecurityAnalysis.expects_structured_output());
        assert!(InvokerKind::ToolCallSynthesis.expects_structured_output());
        assert!(!InvokerKind::QueryGeneration.expects_structured_output());
    }

    #[test]
    fn test_security_report_from_structured() {
        let output = InvokerOutput::Structured(json!({
            "safe": false,
            "issues": ["stacked statements"],
            "confidence": 0.9
        }));
        let report = SecurityReport::from_output(&output).unwrap();
        assert!(!report.safe);
        assert_eq!(report.issues, vec!["stacked statements".to_string()]);
    }

    #[test]
    fn test_security_report_from_text_json() {
        let output = InvokerOutput::Text(r#"{"safe": true}"#.to_string());
        let report = SecurityReport::from_output(&output).unwrap();
        assert!(report.safe);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_security_report_rejects_non_json_text() {
        let output = InvokerOutput::Text("looks fine to me".to_string());
        assert!(SecurityReport::from_output(&output).is_err());
    }
}
