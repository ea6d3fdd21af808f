//! Orchestrator configuration.
//!
//! Loaded from a YAML or JSON file, then overlaid with environment variables:
//!
//! ```yaml
//! eventCapacity: 1024
//! autoApprove: false
//! approvalTimeoutMs: 86400000
//! maxDelayMs: 3600000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

pub const ENV_AUTO_APPROVE: &str = "MARKETFLOW_AUTO_APPROVE";
pub const ENV_APPROVAL_TIMEOUT_MS: &str = "MARKETFLOW_APPROVAL_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
    /// Approve approval steps that do not set `autoApprove` themselves
    pub auto_approve: bool,
    /// Default timeout for approval waits; `None` waits indefinitely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_timeout_ms: Option<u64>,
    /// Upper bound applied to delay steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            auto_approve: false,
            approval_timeout_ms: None,
            max_delay_ms: None,
        }
    }
}

impl OrchestratorConfig {
    /// Parse a YAML document (JSON is accepted too, as a YAML subset).
    pub fn from_yaml(yaml: &str) -> Result<Self, OrchestratorError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| OrchestratorError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Overlay values from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, OrchestratorError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, OrchestratorError> {
        if let Some(raw) = lookup(ENV_AUTO_APPROVE) {
            self.auto_approve = match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(OrchestratorError::Config(format!(
                        "{} must be a boolean, got '{}'",
                        ENV_AUTO_APPROVE, other
                    )))
                }
            };
        }
        if let Some(raw) = lookup(ENV_APPROVAL_TIMEOUT_MS) {
            let ms = raw.trim().parse::<u64>().map_err(|e| {
                OrchestratorError::Config(format!("{} is not a number: {}", ENV_APPROVAL_TIMEOUT_MS, e))
            })?;
            self.approval_timeout_ms = Some(ms);
        }
        Ok(self)
    }
}
