//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and drives the
//! marketflow-core `Orchestrator` directly.

pub mod agent;
pub mod message;
pub mod workflow;

use marketflow_core::{Orchestrator, OrchestratorConfig};
use serde_json::Value;

/// Load configuration from `config_path` (if any), apply environment
/// overrides, then let `adjust` tweak it for the command at hand.
pub fn load_config(
    config_path: Option<&str>,
    adjust: impl FnOnce(&mut OrchestratorConfig),
) -> Result<OrchestratorConfig, String> {
    let config = match config_path {
        Some(path) => OrchestratorConfig::from_file(path).map_err(|e| e.to_string())?,
        None => OrchestratorConfig::default(),
    };
    let mut config = config.with_env_overrides().map_err(|e| e.to_string())?;
    adjust(&mut config);
    Ok(config)
}

/// Build an orchestrator with the built-in agents.
pub fn init_orchestrator(config: OrchestratorConfig) -> Orchestrator {
    tracing::debug!("[CLI] Orchestrator config: {:?}", config);
    Orchestrator::with_defaults(config)
}

/// Parse a JSON (or YAML) value given on the command line.
pub fn parse_value(raw: &str, what: &str) -> Result<Value, String> {
    serde_yaml::from_str(raw).map_err(|e| format!("Invalid {}: {}", what, e))
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
