//! Side-effecting actions invoked by `action` steps.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::ToolError;

/// Performs a named action on behalf of a workflow run.
///
/// Hosts inject their own implementation (publishing, CRM updates, webhooks);
/// the result is stored verbatim as the step result.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn execute_action(&self, action: &str, params: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// Default dispatcher: no external effect, remembers what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingActionDispatcher {
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl RecordingActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions executed so far, oldest first.
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ActionDispatcher for RecordingActionDispatcher {
    async fn execute_action(&self, action: &str, params: &Map<String, Value>) -> Result<Value, ToolError> {
        tracing::debug!("[Executor] Recording action '{}'", action);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((action.to_string(), params.clone()));
        Ok(json!({ "action": action, "executed": true }))
    }
}
