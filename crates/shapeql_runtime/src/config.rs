//! Engine configuration.

use crate::executor::ExecutorConfig;
use serde::{Deserialize, Serialize};
use shapeql_syntax::DEFAULT_MAX_DEPTH;
use std::path::Path;

/// Engine configuration.
///
/// Deserializable so hosts can load it from a JSON file; missing keys take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run query top-level fields as concurrent tasks.
    pub parallel_queries: bool,
    /// Reuse compiled plans for repeated requests.
    pub plan_cache: bool,
    /// Maximum number of cached plans. The oldest entry is evicted first.
    pub plan_cache_capacity: usize,
    /// Deepest nesting of selection sets and list or object values a request
    /// may use.
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl EngineConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self {
            parallel_queries: true,
            plan_cache: true,
            plan_cache_capacity: 256,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Parses a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Sets whether query fields run concurrently.
    #[must_use]
    pub fn parallel_queries(mut self, enabled: bool) -> Self {
        self.parallel_queries = enabled;
        self
    }

    /// Disables the plan cache.
    #[must_use]
    pub fn no_plan_cache(mut self) -> Self {
        self.plan_cache = false;
        self
    }

    #[must_use]
    pub fn plan_cache_capacity(mut self, capacity: usize) -> Self {
        self.plan_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub(crate) fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            parallel_queries: self.parallel_queries,
        }
    }
}
