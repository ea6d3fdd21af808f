use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::AgentCategory;

/// Address used by messages meant for the orchestrator itself.
pub const ORCHESTRATOR_ADDRESS: &str = "orchestrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    Event,
    Error,
}

impl MessageType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "request" => Some(Self::Request),
            "response" => Some(Self::Response),
            "event" => Some(Self::Event),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub correlation_id: String,
}

/// An inter-agent message. `to_agent` holds a category name or `"orchestrator"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub context: MessageContext,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    /// Build a message with a fresh id and correlation id.
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            message_type,
            payload,
            context: MessageContext {
                workflow_id: None,
                step_id: None,
                correlation_id: uuid::Uuid::new_v4().to_string(),
            },
            timestamp: Utc::now(),
        }
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>, step_id: Option<String>) -> Self {
        self.context.workflow_id = Some(workflow_id.into());
        self.context.step_id = step_id;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.context.correlation_id = correlation_id.into();
        self
    }

    /// Addresses compare case-insensitively and ignore surrounding whitespace.
    pub fn is_for_orchestrator(&self) -> bool {
        self.to_agent.trim().eq_ignore_ascii_case(ORCHESTRATOR_ADDRESS)
    }

    /// The category this message targets, if `to_agent` names one.
    pub fn target_category(&self) -> Option<AgentCategory> {
        AgentCategory::from_str(self.to_agent.trim())
    }
}
