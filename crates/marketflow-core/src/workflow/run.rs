//! Workflow run record and its status transitions.
//!
//! ```text
//! pending ──► running ──► completed
//!    │         │  ▲  │
//!    │         ▼  │  └──► failed
//!    │   waitingApproval ──► failed
//!    ▼         │
//! cancelled ◄──┴── (from pending, running or waitingApproval)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OrchestratorError;
use crate::workflow::schema::{StepType, WorkflowDefinition, WorkflowStep};

/// Context key holding the caller's input.
pub const INPUT_KEY: &str = "input";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Pending,
    Running,
    WaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::WaitingApproval => "waitingApproval",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "waitingApproval" | "waiting_approval" => Some(RunStatus::WaitingApproval),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// History entry for one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One execution of a workflow definition against a specific input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: String,
    pub definition: WorkflowDefinition,
    pub status: RunStatus,
    pub current_step_index: usize,
    pub context: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<i64>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl WorkflowRun {
    /// Create a pending run with `context["input"]` seeded.
    pub fn new(definition: WorkflowDefinition, input: Value) -> Self {
        let mut context = Map::new();
        context.insert(INPUT_KEY.to_string(), input);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            definition,
            status: RunStatus::Pending,
            current_step_index: 0,
            context,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            execution_time_ms: None,
            steps: Vec::new(),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.definition.id
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.definition.steps.get(self.current_step_index)
    }

    pub fn step_result(&self, step_id: &str) -> Option<&Value> {
        self.context.get(&crate::workflow::schema::result_key(step_id))
    }

    fn transition(&mut self, allowed: &[RunStatus], to: RunStatus) -> Result<(), OrchestratorError> {
        if !allowed.contains(&self.status) {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.execution_time_ms = Some((now - self.started_at).num_milliseconds());
    }

    pub fn start(&mut self) -> Result<(), OrchestratorError> {
        self.transition(&[RunStatus::Pending], RunStatus::Running)?;
        self.started_at = Utc::now();
        Ok(())
    }

    /// Store a successful step result and advance to the next step.
    pub fn record_success(
        &mut self,
        step: &WorkflowStep,
        result: Value,
        started_at: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        if self.status != RunStatus::Running {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status.to_string(),
                to: RunStatus::Running.to_string(),
            });
        }
        let key = step.result_key();
        if self.context.contains_key(&key) {
            return Err(OrchestratorError::Internal(format!(
                "context key '{}' already written",
                key
            )));
        }
        self.context.insert(key, result);
        self.steps.push(StepRecord {
            step_id: step.id.clone(),
            step_type: step.step_type(),
            status: StepStatus::Completed,
            started_at,
            completed_at: Utc::now(),
            error: None,
        });
        self.current_step_index += 1;
        Ok(())
    }

    /// Mark the run failed at `step`; the step index stays on the failing step.
    pub fn fail(
        &mut self,
        step: &WorkflowStep,
        error: String,
        started_at: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        self.transition(
            &[RunStatus::Running, RunStatus::WaitingApproval],
            RunStatus::Failed,
        )?;
        self.steps.push(StepRecord {
            step_id: step.id.clone(),
            step_type: step.step_type(),
            status: StepStatus::Failed,
            started_at,
            completed_at: Utc::now(),
            error: Some(error.clone()),
        });
        self.error = Some(error);
        self.finish();
        Ok(())
    }

    /// Fail a run that stopped without reaching a step outcome.
    pub fn abort(&mut self, error: String) -> Result<(), OrchestratorError> {
        self.transition(
            &[
                RunStatus::Pending,
                RunStatus::Running,
                RunStatus::WaitingApproval,
            ],
            RunStatus::Failed,
        )?;
        self.error = Some(error);
        self.finish();
        Ok(())
    }

    pub fn wait_for_approval(&mut self) -> Result<(), OrchestratorError> {
        self.transition(&[RunStatus::Running], RunStatus::WaitingApproval)
    }

    pub fn resume(&mut self) -> Result<(), OrchestratorError> {
        self.transition(&[RunStatus::WaitingApproval], RunStatus::Running)
    }

    pub fn complete(&mut self) -> Result<(), OrchestratorError> {
        self.transition(&[RunStatus::Running], RunStatus::Completed)?;
        self.finish();
        Ok(())
    }

    /// Cancel the run, keeping whatever context has accumulated.
    pub fn cancel(&mut self) -> Result<(), OrchestratorError> {
        self.transition(
            &[
                RunStatus::Pending,
                RunStatus::Running,
                RunStatus::WaitingApproval,
            ],
            RunStatus::Cancelled,
        )?;
        self.finish();
        Ok(())
    }
}
