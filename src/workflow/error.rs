// SPDX-License-Identifier: MIT

//! Typed error handling for queryflow.

use std::fmt;
use thiserror::Error;

/// Top-level error type for a workflow run.
///
/// Step-local faults never surface here: they live as strings in the
/// state's error slots and are consumed by refinement, and ceiling
/// exhaustion forces a best-effort response instead of an error.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Run cancelled by the caller; never folded into execution errors
    #[error("run cancelled")]
    Cancelled,

    /// I/O errors from the config layer
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Tag for the four retryable, state-routed error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Execution,
    Generation,
    Tool,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Execution => "execution",
            ErrorKind::Generation => "generation",
            ErrorKind::Tool => "tool",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_display() {
        assert_eq!(WorkflowError::Cancelled.to_string(), "run cancelled");
    }

    #[test]
    fn test_config_errors_pass_through() {
        let err: WorkflowError = serde_yaml::from_str::<u32>("[]").unwrap_err().into();
        assert!(matches!(err, WorkflowError::Yaml(_)));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ErrorKind::Validation.label(), "validation");
        assert_eq!(ErrorKind::Tool.to_string(), "tool");
    }
}
