//! Schema types for workflow definitions.
//!
//! Definitions arrive as JSON from the dashboard or as YAML/JSON files:
//!
//! ```yaml
//! id: "content_pipeline"
//! name: "Content Publishing Pipeline"
//! description: "Review, optimize, and publish content across channels"
//! trigger:
//!   type: event
//!   config:
//!     event: content.ready
//! steps:
//!   - id: draft
//!     type: agent
//!     agentId: content_agent
//!     config:
//!       tool: generate_post
//!       platform: linkedin
//!       topic: "${input.topic}"
//!   - id: wait
//!     type: delay
//!     config:
//!       durationMs: 1000
//!   - id: review
//!     type: approval
//!     config:
//!       approvers: ["editor"]
//!   - id: publish
//!     type: action
//!     config:
//!       action: publish
//! ```
//!
//! Each step's untyped `config` blob is parsed into a per-type configuration
//! when the definition is deserialized, so malformed steps are rejected
//! before a run is ever created.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OrchestratorError;

/// Top-level workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default = "generate_workflow_id")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Descriptive only; the executor never evaluates triggers.
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Ordered list of steps; order is execution order.
    pub steps: Vec<WorkflowStep>,

    #[serde(default)]
    pub status: WorkflowStatus,
}

fn generate_workflow_id() -> String {
    format!("workflow_{}", uuid::Uuid::new_v4())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Active,
    Paused,
    Draft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Schedule,
    Event,
    #[default]
    Manual,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(rename = "type", default)]
    pub trigger_type: TriggerType,

    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Agent,
    Delay,
    Condition,
    Action,
    Approval,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Agent => "agent",
            StepType::Delay => "delay",
            StepType::Condition => "condition",
            StepType::Action => "action",
            StepType::Approval => "approval",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoke `tool` on agent `agent_id`. `params` is the step's full config
/// blob, handed to the tool verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStepConfig {
    pub agent_id: String,
    pub tool: String,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DelayStepConfig {
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConditionStepConfig {
    pub condition: Option<String>,
}

/// Run the named side-effecting action. `params` is the full config blob.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionStepConfig {
    pub action: String,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApprovalStepConfig {
    pub approvers: Vec<String>,
    /// Overrides the orchestrator-wide default when set
    pub auto_approve: Option<bool>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Agent(AgentStepConfig),
    Delay(DelayStepConfig),
    Condition(ConditionStepConfig),
    Action(ActionStepConfig),
    Approval(ApprovalStepConfig),
}

impl StepKind {
    pub fn step_type(&self) -> StepType {
        match self {
            StepKind::Agent(_) => StepType::Agent,
            StepKind::Delay(_) => StepType::Delay,
            StepKind::Condition(_) => StepType::Condition,
            StepKind::Action(_) => StepType::Action,
            StepKind::Approval(_) => StepType::Approval,
        }
    }
}

/// A single step in the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct WorkflowStep {
    pub id: String,
    pub kind: StepKind,
    /// Carried for dashboard compatibility; not used for control flow.
    pub next_steps: Vec<String>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            next_steps: Vec::new(),
        }
    }

    pub fn agent(id: impl Into<String>, agent_id: impl Into<String>, tool: impl Into<String>, params: Value) -> Self {
        let tool = tool.into();
        let mut params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        params.insert("tool".to_string(), Value::String(tool.clone()));
        Self::new(
            id,
            StepKind::Agent(AgentStepConfig {
                agent_id: agent_id.into(),
                tool,
                params,
            }),
        )
    }

    pub fn delay(id: impl Into<String>, duration_ms: u64) -> Self {
        Self::new(id, StepKind::Delay(DelayStepConfig { duration_ms }))
    }

    pub fn condition(id: impl Into<String>, condition: impl Into<String>) -> Self {
        Self::new(
            id,
            StepKind::Condition(ConditionStepConfig {
                condition: Some(condition.into()),
            }),
        )
    }

    pub fn action(id: impl Into<String>, action: impl Into<String>) -> Self {
        let action = action.into();
        let mut params = Map::new();
        params.insert("action".to_string(), Value::String(action.clone()));
        Self::new(id, StepKind::Action(ActionStepConfig { action, params }))
    }

    pub fn approval(id: impl Into<String>, approvers: Vec<String>) -> Self {
        Self::new(
            id,
            StepKind::Approval(ApprovalStepConfig {
                approvers,
                ..Default::default()
            }),
        )
    }

    pub fn step_type(&self) -> StepType {
        self.kind.step_type()
    }

    /// Context key this step's result is stored under.
    pub fn result_key(&self) -> String {
        result_key(&self.id)
    }
}

pub fn result_key(step_id: &str) -> String {
    format!("step_{}_result", step_id)
}

/// Wire shape of a step: `{id, type, agentId?, config, nextSteps?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    id: String,
    #[serde(rename = "type")]
    step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
    #[serde(default)]
    config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    next_steps: Vec<String>,
}

impl TryFrom<RawStep> for WorkflowStep {
    type Error = OrchestratorError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let invalid = |msg: String| OrchestratorError::InvalidWorkflow(format!("step '{}': {}", raw.id, msg));
        let config = raw.config;

        let kind = match raw.step_type {
            StepType::Agent => {
                let agent_id = raw
                    .agent_id
                    .clone()
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| invalid("agent step requires agentId".to_string()))?;
                let tool = config
                    .get("tool")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| invalid("agent step requires config.tool".to_string()))?
                    .to_string();
                StepKind::Agent(AgentStepConfig {
                    agent_id,
                    tool,
                    params: config,
                })
            }
            StepType::Delay => {
                let raw_duration = config.get("durationMs").or_else(|| config.get("duration"));
                let duration_ms = match raw_duration {
                    None | Some(Value::Null) => 0,
                    Some(v) => non_negative_ms(v)
                        .ok_or_else(|| invalid(format!("durationMs must be a non-negative number, got {}", v)))?,
                };
                StepKind::Delay(DelayStepConfig { duration_ms })
            }
            StepType::Condition => StepKind::Condition(ConditionStepConfig {
                condition: config.get("condition").and_then(Value::as_str).map(String::from),
            }),
            StepType::Action => {
                let action = config
                    .get("action")
                    .and_then(Value::as_str)
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| invalid("action step requires config.action".to_string()))?
                    .to_string();
                StepKind::Action(ActionStepConfig {
                    action,
                    params: config,
                })
            }
            StepType::Approval => {
                let approvers = match config.get("approvers") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|a| {
                            a.as_str()
                                .map(String::from)
                                .ok_or_else(|| invalid("approvers must be strings".to_string()))
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    Some(_) => return Err(invalid("approvers must be a list".to_string())),
                };
                let timeout_ms = match config.get("timeoutMs") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(
                        non_negative_ms(v)
                            .ok_or_else(|| invalid("timeoutMs must be a non-negative number".to_string()))?,
                    ),
                };
                StepKind::Approval(ApprovalStepConfig {
                    approvers,
                    auto_approve: config.get("autoApprove").and_then(Value::as_bool),
                    timeout_ms,
                })
            }
        };

        Ok(WorkflowStep {
            id: raw.id,
            kind,
            next_steps: raw.next_steps,
        })
    }
}

impl From<WorkflowStep> for RawStep {
    fn from(step: WorkflowStep) -> Self {
        let step_type = step.step_type();
        let mut agent_id = None;
        let config = match step.kind {
            StepKind::Agent(cfg) => {
                agent_id = Some(cfg.agent_id);
                let mut params = cfg.params;
                params.insert("tool".to_string(), Value::String(cfg.tool));
                params
            }
            StepKind::Delay(cfg) => {
                let mut map = Map::new();
                map.insert("durationMs".to_string(), Value::from(cfg.duration_ms));
                map
            }
            StepKind::Condition(cfg) => {
                let mut map = Map::new();
                if let Some(condition) = cfg.condition {
                    map.insert("condition".to_string(), Value::String(condition));
                }
                map
            }
            StepKind::Action(cfg) => {
                let mut params = cfg.params;
                params.insert("action".to_string(), Value::String(cfg.action));
                params
            }
            StepKind::Approval(cfg) => {
                let mut map = Map::new();
                map.insert(
                    "approvers".to_string(),
                    Value::Array(cfg.approvers.into_iter().map(Value::String).collect()),
                );
                if let Some(auto) = cfg.auto_approve {
                    map.insert("autoApprove".to_string(), Value::Bool(auto));
                }
                if let Some(ms) = cfg.timeout_ms {
                    map.insert("timeoutMs".to_string(), Value::from(ms));
                }
                map
            }
        };

        RawStep {
            id: step.id,
            step_type,
            agent_id,
            config,
            next_steps: step.next_steps,
        }
    }
}

fn non_negative_ms(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0 && f.is_finite()).map(|f| f as u64))
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            trigger: TriggerConfig::default(),
            steps,
            status: WorkflowStatus::Active,
        }
    }

    /// Parse a workflow definition from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, OrchestratorError> {
        serde_json::from_str(json).map_err(|e| {
            OrchestratorError::InvalidWorkflow(format!("Failed to parse workflow JSON: {}", e))
        })
    }

    /// Parse a workflow definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, OrchestratorError> {
        serde_yaml::from_str(yaml).map_err(|e| {
            OrchestratorError::InvalidWorkflow(format!("Failed to parse workflow YAML: {}", e))
        })
    }

    /// Load a definition from a file; `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::InvalidWorkflow(format!(
                "Failed to read workflow file '{}': {}",
                path.display(),
                e
            ))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Structural checks required before a run can be created.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.steps.is_empty() {
            return Err(OrchestratorError::InvalidWorkflow(format!(
                "workflow '{}' has no steps",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(OrchestratorError::InvalidWorkflow(format!(
                    "workflow '{}' has a step with an empty id",
                    self.id
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(OrchestratorError::InvalidWorkflow(format!(
                    "workflow '{}' has duplicate step id '{}'",
                    self.id, step.id
                )));
            }
        }
        Ok(())
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}
