//! Agent registry: the set of agents available to workflows and messages.
//!
//! Entries are keyed by agent id and never removed. The registry is
//! read-mostly: executors and the dispatcher take short read locks, while
//! registration takes the write lock.

mod defaults;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::OrchestratorError;
use crate::models::{AgentCategory, AgentInfo, AgentMessage, AgentStatus};
use crate::tools::{AgentState, Tool, ToolDefinition};

/// A registered agent: identity, lifecycle status, tools, scratch state and
/// the inbox the dispatcher delivers into.
///
/// The inbox is unbounded. It only shrinks when the host drains it with
/// [`AgentEntry::take_messages`], so hosts that route messages to an agent
/// are expected to consume them.
pub struct AgentEntry {
    id: String,
    name: String,
    category: AgentCategory,
    description: String,
    status: RwLock<AgentStatus>,
    /// Tool calls currently running on this agent across all runs.
    in_flight: Mutex<usize>,
    state: AgentState,
    tools: Vec<Arc<dyn Tool>>,
    inbox: Mutex<VecDeque<AgentMessage>>,
}

impl AgentEntry {
    /// Build an entry. Tool names must be unique within the agent.
    pub fn new(info: AgentInfo, tools: Vec<Arc<dyn Tool>>) -> Result<Self, OrchestratorError> {
        let mut seen = HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name().to_string()) {
                return Err(OrchestratorError::DuplicateTool {
                    agent: info.id.clone(),
                    tool: tool.name().to_string(),
                });
            }
        }

        Ok(Self {
            id: info.id,
            name: info.name,
            category: info.category,
            description: info.description,
            status: RwLock::new(info.status),
            in_flight: Mutex::new(0),
            state: AgentState::new(),
            tools,
            inbox: Mutex::new(VecDeque::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> AgentCategory {
        self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> AgentStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: AgentStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Mark a tool call as started; the agent reports `running`.
    pub(crate) fn begin_call(&self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        *in_flight += 1;
        self.set_status(AgentStatus::Running);
    }

    /// Mark a tool call as finished. A failure sets `error` right away; a
    /// success returns the agent to `idle` only once no other call is running.
    pub(crate) fn end_call(&self, succeeded: bool) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        *in_flight = in_flight.saturating_sub(1);
        if !succeeded {
            self.set_status(AgentStatus::Error);
        } else if *in_flight == 0 {
            self.set_status(AgentStatus::Idle);
        }
    }

    /// Snapshot of the identity with the current status.
    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category,
            status: self.status(),
            description: self.description.clone(),
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition().clone()).collect()
    }

    pub(crate) fn deliver(&self, message: AgentMessage) {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(message);
    }

    /// Drain every message routed to this agent, oldest first. This is the
    /// only way the inbox shrinks.
    pub fn take_messages(&self) -> Vec<AgentMessage> {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn pending_messages(&self) -> usize {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for AgentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEntry")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("status", &self.status())
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, Arc<AgentEntry>>,
    /// Registration order, used for "first agent of a category" lookups.
    order: Vec<String>,
}

/// Registry of agents keyed by id.
#[derive(Default)]
pub struct AgentRegistry {
    inner: RwLock<RegistryInner>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in content, social and email agents.
    pub fn with_default_agents() -> Self {
        let registry = Self::new();
        for entry in defaults::default_agents() {
            // Built-in ids are distinct, so registration cannot collide.
            if let Err(e) = registry.register(entry) {
                tracing::error!("[Registry] Failed to register built-in agent: {}", e);
            }
        }
        registry
    }

    pub fn register(&self, entry: AgentEntry) -> Result<Arc<AgentEntry>, OrchestratorError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.by_id.contains_key(&entry.id) {
            return Err(OrchestratorError::DuplicateAgent(entry.id.clone()));
        }

        let entry = Arc::new(entry);
        inner.order.push(entry.id.clone());
        inner.by_id.insert(entry.id.clone(), entry.clone());
        tracing::info!(
            "[Registry] Registered agent {} ({}) with {} tool(s)",
            entry.id,
            entry.category,
            entry.tools.len()
        );
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentEntry>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(id)
            .cloned()
    }

    /// Snapshot of every entry in registration order.
    pub fn all(&self) -> Vec<Arc<AgentEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First registered agent of `category`.
    pub fn find_by_category(&self, category: AgentCategory) -> Option<Arc<AgentEntry>> {
        self.all().into_iter().find(|e| e.category == category)
    }

    /// First agent of `category` exposing `tool_name`, with the tool itself.
    pub fn find_tool_by_category(
        &self,
        category: AgentCategory,
        tool_name: &str,
    ) -> Option<(Arc<AgentEntry>, Arc<dyn Tool>)> {
        self.all()
            .into_iter()
            .filter(|e| e.category == category)
            .find_map(|e| e.tool(tool_name).map(|t| (e.clone(), t)))
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.all()).finish()
    }
}
