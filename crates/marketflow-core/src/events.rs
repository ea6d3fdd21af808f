//! Event bus: broadcast of run, step, approval and message lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::AgentMessage;

/// Events emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OrchestratorEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        run_id: String,
        workflow_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    StepStarted {
        run_id: String,
        step_index: usize,
        step_id: String,
    },
    #[serde(rename_all = "camelCase")]
    StepCompleted {
        run_id: String,
        step_index: usize,
        step_id: String,
    },
    #[serde(rename_all = "camelCase")]
    StepFailed {
        run_id: String,
        step_index: usize,
        step_id: String,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    ApprovalRequested {
        run_id: String,
        step_id: String,
        approvers: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    ApprovalResolved {
        run_id: String,
        step_id: String,
        approved: bool,
    },
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        run_id: String,
        execution_time_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    RunFailed {
        run_id: String,
        step_index: usize,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    RunCancelled { run_id: String, step_index: usize },
    #[serde(rename_all = "camelCase")]
    MessageDelivered { message_id: String, agent_id: String },
    #[serde(rename_all = "camelCase")]
    MessageDropped { message_id: String, to_agent: String },
    OrchestratorMessage { message: AgentMessage },
}

/// Cloneable handle to the broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; having no subscribers is not an error.
    pub fn emit(&self, event: OrchestratorEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
