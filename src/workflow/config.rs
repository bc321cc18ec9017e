// SPDX-License-Identifier: MIT

//! Run configuration. The source of these values (CLI, service config) is
//! outside the engine; the engine only consumes them.

use super::error::WorkflowError;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_ITERATION_CEILING: u32 = 10;
pub const DEFAULT_SCHEMA_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum refinement/retry attempts per run
    pub iteration_ceiling: u32,
    /// Operator override: skip both validator stages
    pub allow_unsafe_queries: bool,
    /// Operator override: no store operations, tool-only run
    pub skip_store_operations: bool,
    /// Use the built-in response prompt instead of prompt synthesis
    pub disable_prompt_generation: bool,
    /// Terminate through the raw formatting paths instead of the model
    pub disable_response_generation: bool,
    /// Run the contextual (stage 2) security analysis
    pub enable_security_analysis: bool,
    /// TTL for the shared schema cache
    pub schema_ttl_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iteration_ceiling: DEFAULT_ITERATION_CEILING,
            allow_unsafe_queries: false,
            skip_store_operations: false,
            disable_prompt_generation: false,
            disable_response_generation: false,
            enable_security_analysis: false,
            schema_ttl_secs: DEFAULT_SCHEMA_TTL_SECS,
        }
    }
}

impl RunConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self, WorkflowError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}
