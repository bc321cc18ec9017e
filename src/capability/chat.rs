// SPDX-License-Identifier: MIT

//! Chat-completions backed invoker.
//!
//! Thin HTTP client speaking the OpenAI-compatible chat API. Each invoker
//! kind maps to its own system prompt; structured kinds request a JSON
//! object response and parse it before handing it back.

use super::invoker::{InvokerKind, InvokerOutput, InvokerRequest, LanguageModelInvoker};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::error::Error;

pub struct ChatInvoker {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl ChatInvoker {
    /// Requires `QUERYFLOW_API_KEY`. Optionally uses `QUERYFLOW_BASE_URL`
    /// for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let api_key = env::var("QUERYFLOW_API_KEY").map_err(|_| "QUERYFLOW_API_KEY must be set")?;
        let base_url = env::var("QUERYFLOW_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url,
        })
    }

    fn system_prompt(kind: InvokerKind) -> &'static str {
        match kind {
            InvokerKind::QueryGeneration => {
                "You translate a natural-language request into a single read-only \
                 query against the schema provided. Reply with the query only, \
                 no commentary and no code fences."
            }
            InvokerKind::QueryRefinement => {
                "A previously generated query failed. Using the error context and \
                 the full history of attempted queries, produce one corrected \
                 read-only query. Never repeat a query from the history. Reply \
                 with the query only."
            }
            InvokerKind::WiderSearch => {
                "The previous query ran without error but returned no rows. \
                 Propose an alternative, broader read-only query for the same \
                 request. Never repeat a query from the history. Reply with the \
                 query only."
            }
            InvokerKind::SecurityAnalysis => {
                "You review a query for injection or mutation risk given the \
                 schema. Reply with a JSON object: {\"safe\": bool, \"issues\": \
                 [string], \"confidence\": number, \"explanation\": string}."
            }
            InvokerKind::PromptSynthesis => {
                "Compose a prompt that will let an assistant answer the user's \
                 request from the query results and tool results provided. Reply \
                 with the prompt text only."
            }
            InvokerKind::ToolCallSynthesis => {
                "Decide which of the available tool services to call for this \
                 request. Reply with a JSON object: {\"calls\": [{\"tool\": \
                 string, \"args\": object}], \"route_to_model\": bool}. Use an \
                 empty calls array when no tool helps."
            }
            InvokerKind::ResponseSynthesis => {
                "Answer the user's request in clear natural language using only \
                 the material in the prompt."
            }
        }
    }

    /// Assemble the user message from the request context sections.
    fn build_user_message(request: &InvokerRequest) -> String {
        let mut sections = vec![format!("Request: {}", request.request)];

        if let Some(schema) = &request.schema_context {
            sections.push(format!("Schema:\n{schema}"));
        }
        if !request.query_history.is_empty() {
            sections.push(format!(
                "Previously attempted queries:\n{}",
                request.query_history.join("\n")
            ));
        }
        if let Some(errors) = &request.error_context {
            sections.push(format!("Errors from previous attempts:\n{errors}"));
        }
        if let Some(results) = &request.result_context {
            sections.push(format!("Query results:\n{results}"));
        }
        if let Some(tools) = &request.tool_context {
            sections.push(format!("Tool context:\n{tools}"));
        }

        sections.join("\n\n")
    }

    fn parse_chat_response(
        kind: InvokerKind,
        response: &serde_json::Value,
    ) -> Result<InvokerOutput, Box<dyn Error + Send + Sync>> {
        let content = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or("no content in chat response")?;

        if kind.expects_structured_output() {
            let value: serde_json::Value = serde_json::from_str(content.trim())
                .map_err(|e| format!("expected JSON output for {}: {e}", kind.as_str()))?;
            Ok(InvokerOutput::Structured(value))
        } else {
            Ok(InvokerOutput::Text(content.trim().to_string()))
        }
    }
}

#[async_trait]
impl LanguageModelInvoker for ChatInvoker {
    async fn generate(
        &self,
        kind: InvokerKind,
        request: &InvokerRequest,
    ) -> Result<InvokerOutput, Box<dyn Error + Send + Sync>> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model_name,
            "messages": [
                {"role": "system", "content": Self::system_prompt(kind)},
                {"role": "user", "content": Self::build_user_message(request)}
            ]
        });

        if kind.expects_structured_output() {
            body["response_format"] = json!({"type": "json_object"});
        }

        log::debug!("chat invoker {} request to {}", kind.as_str(), url);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(format!("chat API error for {}: {text}", kind.as_str()).into());
        }

        let resp_json: serde_json::Value = resp.json().await?;
        Self::parse_chat_response(kind, &resp_json)
    }
}
