//! Configuration loading and management

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::error::JitError;

/// Plan cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Keep compiled plans between requests; `false` rebuilds every request
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum number of cached plans
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Seconds after insertion before an entry is rebuilt; none disables expiry
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            capacity: default_capacity(),
            ttl_seconds: None,
        }
    }
}

/// Plan invocation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Launch suspending siblings together (`false` awaits them in order)
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Abandon an invocation after this many milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            timeout_ms: None,
        }
    }
}

/// Complete engine configuration
///
/// ```yaml
/// cache:
///   enabled: true
///   capacity: 500
///   ttl_seconds: 3600
/// execution:
///   parallel: true
///   timeout_ms: 2000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

fn default_enabled() -> bool {
    true
}

fn default_capacity() -> usize {
    1000
}

fn default_parallel() -> bool {
    true
}

impl JitConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), JitError> {
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(JitError::Config {
                message: "cache.capacity must be greater than zero".to_string(),
            });
        }
        if self.execution.timeout_ms == Some(0) {
            return Err(JitError::Config {
                message: "execution.timeout_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
