//! marketflow core: transport-agnostic orchestration for marketing agents.
//!
//! This crate contains the agent registry, message dispatcher, approval
//! broker and workflow run engine. It has no HTTP or UI dependency, making it
//! suitable for use in:
//!
//! - the `marketflow` CLI
//! - an HTTP/dashboard backend
//! - background workers

pub mod approvals;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod store;
pub mod tools;
pub mod workflow;

// Convenience re-exports
pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use events::{EventBus, OrchestratorEvent};
pub use orchestration::Orchestrator;
pub use registry::{AgentEntry, AgentRegistry};
pub use workflow::{RunStatus, WorkflowDefinition, WorkflowRun, WorkflowStep};
