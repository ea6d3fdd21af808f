//! Core error type for the marketflow orchestration engine.
//!
//! `OrchestratorError` is used throughout the core domain (registry,
//! executor, dispatcher, stores). Step-level failures are recorded on the
//! run as their `Display` text rather than returned to `submit` callers.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Duplicate tool '{tool}' on agent {agent}")]
    DuplicateTool { agent: String, tool: String },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Tool '{tool}' not found on agent {agent}")]
    ToolNotFound { agent: String, tool: String },

    #[error("Step {step_id} failed: {message}")]
    StepExecution { step_id: String, message: String },

    #[error("Approval rejected at step {step_id}{}", reviewer.as_ref().map(|r| format!(" by {}", r)).unwrap_or_default())]
    ApprovalRejected {
        step_id: String,
        reviewer: Option<String>,
    },

    #[error("Approval timed out at step {step_id}")]
    ApprovalTimeout { step_id: String },

    #[error("No agent registered for category '{to}'")]
    UnroutableMessage { to: String },

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("No pending approval for run {run_id} step {step_id}")]
    ApprovalNotFound { run_id: String, step_id: String },

    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_not_found_mentions_id() {
        let err = OrchestratorError::AgentNotFound("missing_agent".to_string());
        assert!(err.to_string().contains("missing_agent"));
    }

    #[test]
    fn test_approval_rejected_display() {
        let err = OrchestratorError::ApprovalRejected {
            step_id: "review".to_string(),
            reviewer: Some("editor".to_string()),
        };
        assert_eq!(err.to_string(), "Approval rejected at step review by editor");

        let err = OrchestratorError::ApprovalRejected {
            step_id: "review".to_string(),
            reviewer: None,
        };
        assert_eq!(err.to_string(), "Approval rejected at step review");
    }
}
