// SPDX-License-Identifier: MIT

//! Two-stage query safety validation.
//!
//! Stage 1 is deterministic and purely lexical: leading-keyword allow list,
//! single-statement rule, comment sequences, a mutating-keyword deny list
//! matched on identifier boundaries, and injection-indicative patterns.
//! Stage 2, when enabled, asks the security-analysis invoker kind for a
//! contextual verdict; an invoker fault falls back to the stage-1 verdict.

use crate::capability::invoker::{
    InvokerKind, InvokerRequest, LanguageModelInvoker, SecurityReport,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Unsafe(String),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }
}

const ALLOWED_LEADING_KEYWORDS: &[&str] = &["select", "show", "describe", "explain", "with"];

const MUTATING_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "create", "alter", "truncate", "grant", "revoke",
    "merge", "replace", "call", "exec", "execute", "eval", "attach", "detach", "vacuum", "set",
];

const SYSTEM_CATALOGS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "pg_shadow",
    "sysobjects",
    "syscolumns",
    "mysql.user",
];

const TIMING_PRIMITIVES: &[&str] = &["sleep(", "pg_sleep", "benchmark(", "waitfor"];

/// The query with single-quoted string literal contents blanked out, so
/// lexical checks never fire on user-supplied literal text.
fn mask_string_literals(query: &str) -> String {
    let mut masked = String::with_capacity(query.len());
    let mut in_string = false;
    for c in query.chars() {
        if c == '\'' {
            in_string = !in_string;
            masked.push(c);
        } else if in_string {
            masked.push(' ');
        } else {
            masked.push(c);
        }
    }
    masked
}

/// Identifier tokens of the masked query, lowercased. `created_at` is one
/// token, so it can never match the `create` deny-list entry.
fn identifier_tokens(masked: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in masked.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            current.push(c.to_ascii_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Stage 1: deterministic lexical rules. Pure; identical input yields an
/// identical verdict.
pub fn check_deterministic(query: &str) -> Verdict {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Verdict::Unsafe("empty query".to_string());
    }

    let masked = mask_string_literals(trimmed);
    let lowered = masked.to_lowercase();
    let tokens = identifier_tokens(&masked);

    match tokens.first() {
        Some(first) if ALLOWED_LEADING_KEYWORDS.contains(&first.as_str()) => {}
        Some(first) => {
            return Verdict::Unsafe(format!("query must start with a read-only keyword, found '{first}'"));
        }
        None => return Verdict::Unsafe("query contains no keywords".to_string()),
    }

    // Deny-listed keywords first: their reason must name the keyword even
    // when the query would also trip the statement or comment rules.
    for token in &tokens {
        if MUTATING_KEYWORDS.contains(&token.as_str()) {
            return Verdict::Unsafe(format!("mutating keyword '{token}' is not allowed"));
        }
    }

    // Single statement: a semicolon is only tolerated in trailing position.
    if let Some(pos) = masked.find(';') {
        if !masked[pos + 1..].trim_end_matches(';').trim().is_empty() {
            return Verdict::Unsafe("multiple statements are not allowed".to_string());
        }
    }

    for seq in ["--", "/*", "#"] {
        if masked.contains(seq) {
            return Verdict::Unsafe(format!("comment sequence '{seq}' is not allowed"));
        }
    }

    for catalog in SYSTEM_CATALOGS {
        if lowered.contains(catalog) {
            return Verdict::Unsafe(format!("system catalog reference '{catalog}' is not allowed"));
        }
    }

    for primitive in TIMING_PRIMITIVES {
        if lowered.contains(primitive) {
            return Verdict::Unsafe(format!("timing primitive '{primitive}' is not allowed"));
        }
    }

    if tokens
        .iter()
        .any(|t| t.starts_with("0x") && t.len() > 2 && t[2..].chars().all(|c| c.is_ascii_hexdigit()))
    {
        return Verdict::Unsafe("hex literal escapes are not allowed".to_string());
    }
    if lowered.contains("\\x") {
        return Verdict::Unsafe("binary literal escapes are not allowed".to_string());
    }

    Verdict::Safe
}

/// Runs both stages before every execution.
pub struct Validator {
    invoker: Arc<dyn LanguageModelInvoker>,
    /// Stage 2 toggle
    contextual_analysis: bool,
    /// Operator override: skip both stages entirely
    bypass: bool,
}

impl Validator {
    pub fn new(
        invoker: Arc<dyn LanguageModelInvoker>,
        contextual_analysis: bool,
        bypass: bool,
    ) -> Self {
        Self {
            invoker,
            contextual_analysis,
            bypass,
        }
    }

    pub async fn validate(&self, query: &str, schema_context: &str) -> Verdict {
        if self.bypass {
            log::warn!("safety bypass is set; skipping both validator stages");
            return Verdict::Safe;
        }

        let stage1 = check_deterministic(query);
        if !stage1.is_safe() {
            return stage1;
        }

        if !self.contextual_analysis {
            return stage1;
        }

        let request = InvokerRequest {
            request: query.to_string(),
            schema_context: Some(schema_context.to_string()),
            ..InvokerRequest::default()
        };

        match self.invoker.generate(InvokerKind::SecurityAnalysis, &request).await {
            Ok(output) => match SecurityReport::from_output(&output) {
                Ok(report) if !report.safe => {
                    let reason = if report.issues.is_empty() {
                        report
                            .explanation
                            .unwrap_or_else(|| "flagged by security analysis".to_string())
                    } else {
                        report.issues.join("; ")
                    };
                    Verdict::Unsafe(reason)
                }
                Ok(_) => Verdict::Safe,
                Err(e) => {
                    log::warn!("unparseable security report, keeping stage-1 verdict: {e}");
                    stage1
                }
            },
            Err(e) => {
                log::warn!("security analysis unavailable, keeping stage-1 verdict: {e}");
                stage1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::invoker::InvokerOutput;
    use async_trait::async_trait;
    use serde_json::json;
    use std::error::Error;

    #[test]
    fn test_plain_select_is_safe() {
        assert_eq!(check_deterministic("SELECT * FROM customers"), Verdict::Safe);
    }

    #[test]
    fn test_trailing_semicolon_is_safe() {
        assert_eq!(check_deterministic("SELECT id FROM orders;"), Verdict::Safe);
    }

    #[test]
    fn test_two_statements_are_unsafe() {
        let verdict = check_deterministic("SELECT 1; SELECT 2");
        match verdict {
            Verdict::Unsafe(reason) => assert!(reason.contains("multiple statements")),
            Verdict::Safe => panic!("expected Unsafe"),
        }
    }

    #[test]
    fn test_mutating_statement_names_keyword() {
        let verdict = check_deterministic("DROP TABLE customers");
        match verdict {
            Verdict::Unsafe(reason) => {
                // Leading-keyword rule fires first and still names the keyword
                assert!(reason.contains("drop"), "reason was: {reason}");
            }
            Verdict::Safe => panic!("expected Unsafe"),
        }
    }

    #[test]
    fn test_embedded_mutating_keyword_names_keyword() {
        // Also trips the multiple-statement rule, but the reason must still
        // name the deny-listed keyword
        let verdict = check_deterministic("SELECT * FROM t WHERE x = 1; DROP TABLE t");
        match verdict {
            Verdict::Unsafe(reason) => assert!(reason.contains("drop"), "reason was: {reason}"),
            Verdict::Safe => panic!("expected Unsafe"),
        }

        let verdict = check_deterministic("WITH d AS (DELETE FROM t RETURNING id) SELECT * FROM d");
        match verdict {
            Verdict::Unsafe(reason) => assert!(reason.contains("delete")),
            Verdict::Safe => panic!("expected Unsafe"),
        }
    }

    #[test]
    fn test_created_at_is_not_flagged() {
        assert_eq!(
            check_deterministic("SELECT created_at, updated_at, deleted_at FROM customers"),
            Verdict::Safe
        );
    }

    #[test]
    fn test_comment_sequences_are_unsafe() {
        assert!(!check_deterministic("SELECT 1 -- hidden").is_safe());
        assert!(!check_deterministic("SELECT /* hidden */ 1").is_safe());
        assert!(!check_deterministic("SELECT 1 # hidden").is_safe());
    }

    #[test]
    fn test_string_literals_are_masked() {
        // Dangerous-looking text inside a literal is data, not syntax
        assert_eq!(
            check_deterministic("SELECT * FROM notes WHERE body = 'drop table; -- ha'"),
            Verdict::Safe
        );
    }

    #[test]
    fn test_system_catalog_reference_is_unsafe() {
        let verdict = check_deterministic("SELECT * FROM information_schema.tables");
        match verdict {
            Verdict::Unsafe(reason) => assert!(reason.contains("information_schema")),
            Verdict::Safe => panic!("expected Unsafe"),
        }
    }

    #[test]
    fn test_timing_primitive_is_unsafe() {
        assert!(!check_deterministic("SELECT sleep(10)").is_safe());
        assert!(!check_deterministic("SELECT pg_sleep(10)").is_safe());
    }

    #[test]
    fn test_hex_literal_is_unsafe() {
        assert!(!check_deterministic("SELECT 0x64726f70").is_safe());
    }

    #[test]
    fn test_non_select_leading_keyword_is_unsafe() {
        assert!(!check_deterministic("INSERT INTO t VALUES (1)").is_safe());
        assert!(!check_deterministic("TRUNCATE t").is_safe());
    }

    #[test]
    fn test_stage_one_is_idempotent() {
        let query = "SELECT created_at FROM customers WHERE id = 7;";
        let first = check_deterministic(query);
        for _ in 0..5 {
            assert_eq!(check_deterministic(query), first);
        }
    }

    // --- Stage 2 ---

    struct ScriptedInvoker {
        response: Result<serde_json::Value, String>,
    }

    #[async_trait]
    impl LanguageModelInvoker for ScriptedInvoker {
        async fn generate(
            &self,
            _kind: InvokerKind,
            _request: &InvokerRequest,
        ) -> Result<InvokerOutput, Box<dyn Error + Send + Sync>> {
            match &self.response {
                Ok(v) => Ok(InvokerOutput::Structured(v.clone())),
                Err(e) => Err(e.clone().into()),
            }
        }
    }

    #[tokio::test]
    async fn test_stage_two_can_reject_a_lexically_clean_query() {
        let invoker = Arc::new(ScriptedInvoker {
            response: Ok(json!({"safe": false, "issues": ["exfiltrates credentials"]})),
        });
        let validator = Validator::new(invoker, true, false);

        let verdict = validator
            .validate("SELECT password FROM credentials", "table credentials")
            .await;
        match verdict {
            Verdict::Unsafe(reason) => assert!(reason.contains("exfiltrates")),
            Verdict::Safe => panic!("expected Unsafe"),
        }
    }

    #[tokio::test]
    async fn test_invoker_fault_falls_back_to_stage_one() {
        let invoker = Arc::new(ScriptedInvoker {
            response: Err("timeout".to_string()),
        });
        let validator = Validator::new(invoker, true, false);

        let verdict = validator.validate("SELECT * FROM customers", "").await;
        assert_eq!(verdict, Verdict::Safe);
    }

    #[tokio::test]
    async fn test_stage_two_never_rescues_a_stage_one_rejection() {
        let invoker = Arc::new(ScriptedInvoker {
            response: Ok(json!({"safe": true})),
        });
        let validator = Validator::new(invoker, true, false);

        let verdict = validator.validate("DROP TABLE t", "").await;
        assert!(!verdict.is_safe());
    }

    #[tokio::test]
    async fn test_bypass_skips_both_stages() {
        let invoker = Arc::new(ScriptedInvoker {
            response: Ok(json!({"safe": false})),
        });
        let validator = Validator::new(invoker, true, true);

        let verdict = validator.validate("DROP TABLE t", "").await;
        assert_eq!(verdict, Verdict::Safe);
    }
}
