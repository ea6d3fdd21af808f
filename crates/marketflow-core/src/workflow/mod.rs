//! Workflow engine: ordered multi-step marketing pipelines.
//!
//! Definitions are loaded from JSON or YAML, validated, then executed one run
//! per task against the agent registry.
//!
//! # Architecture
//!
//! ```text
//! workflow.yaml ──► WorkflowDefinition ──► WorkflowRun (pending)
//!                                              │
//!                                       WorkflowExecutor
//!                    ┌──────────┬──────────┬───┴──────┬─────────────┐
//!                  agent      delay     condition   action       approval
//!                    │                                │             │
//!              AgentRegistry                  ActionDispatcher  ApprovalBroker
//! ```

pub mod actions;
pub mod condition;
pub mod executor;
pub mod run;
pub mod schema;

pub use actions::{ActionDispatcher, RecordingActionDispatcher};
pub use executor::WorkflowExecutor;
pub use run::{RunStatus, StepRecord, StepStatus, WorkflowRun, INPUT_KEY};
pub use schema::{
    result_key, ActionStepConfig, AgentStepConfig, ApprovalStepConfig, ConditionStepConfig,
    DelayStepConfig, StepKind, StepType, TriggerConfig, TriggerType, WorkflowDefinition,
    WorkflowStatus, WorkflowStep,
};
