//! Tools: the callable units of work agents expose to workflows.
//!
//! A tool is described by a [`ToolDefinition`] (name, description and a
//! parameter contract) and executed through the async [`Tool`] trait. The
//! orchestrator never inspects what a tool does; it only requires that
//! `execute` resolves to a JSON value or fails with a [`ToolError`].
//!
//! Tools receive the [`AgentState`] handle of the agent that owns them and no
//! other, which is how per-agent scratch state stays private to its agent.

pub mod builtin;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Failed(String),
}

/// JSON type a tool parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn required(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: true,
            description: None,
        }
    }

    pub fn optional(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: false,
            description: None,
        }
    }
}

/// Name, description and parameter contract of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamSpec>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    /// Check `params` against the contract. Unknown keys are allowed since
    /// workflow steps pass their whole config blob through.
    pub fn validate(&self, params: &Value) -> Result<(), ToolError> {
        let obj = match params {
            Value::Object(map) => map,
            Value::Null => {
                return match self.parameters.iter().find(|(_, s)| s.required) {
                    Some((name, _)) => Err(ToolError::InvalidParams(format!(
                        "missing required parameter '{}'",
                        name
                    ))),
                    None => Ok(()),
                };
            }
            _ => {
                return Err(ToolError::InvalidParams(
                    "parameters must be a JSON object".to_string(),
                ))
            }
        };

        for (name, spec) in &self.parameters {
            match obj.get(name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(ToolError::InvalidParams(format!(
                        "missing required parameter '{}'",
                        name
                    )));
                }
                Some(value) if !value.is_null() && !spec.param_type.matches(value) => {
                    return Err(ToolError::InvalidParams(format!(
                        "parameter '{}' must be of type {:?}",
                        name, spec.param_type
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Handle to one agent's scratch state.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().await.insert(key.into(), value);
    }

    /// Add `delta` to a numeric counter, starting from zero.
    pub async fn increment(&self, key: &str, delta: i64) -> i64 {
        let mut state = self.inner.write().await;
        let next = state.get(key).and_then(Value::as_i64).unwrap_or(0) + delta;
        state.insert(key.to_string(), Value::from(next));
        next
    }

    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    async fn execute(&self, params: Value, state: &AgentState) -> Result<Value, ToolError>;

    fn name(&self) -> &str {
        &self.definition().name
    }
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;
type ToolFn = dyn Fn(Value, AgentState) -> ToolFuture + Send + Sync;

/// A tool backed by an async closure.
pub struct FnTool {
    definition: ToolDefinition,
    handler: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F, Fut>(definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(Value, AgentState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            definition,
            handler: Box::new(move |params, state| Box::pin(handler(params, state))),
        }
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.definition.name)
            .finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, params: Value, state: &AgentState) -> Result<Value, ToolError> {
        (self.handler)(params, state.clone()).await
    }
}

/// Read a string parameter, treating absence as an empty string.
pub(crate) fn str_param<'a>(params: &'a Value, key: &str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or("")
}
