//! Orchestrator: the service hosts construct once and share by `Arc`.
//!
//! It owns the agent registry, message dispatcher, approval broker, run store
//! and workflow catalog, and spawns one executor task per submitted run:
//!
//! 1. `submit` validates the definition, stores a `pending` run and spawns it
//! 2. the executor walks the steps, publishing snapshots as it goes
//! 3. `wait` resolves once the run reaches a terminal status
//!
//! Runs are independent: each has its own context, cancellation token and
//! snapshot channel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::approvals::ApprovalBroker;
use crate::config::OrchestratorConfig;
use crate::dispatch::{DispatchStats, MessageDispatcher};
use crate::error::OrchestratorError;
use crate::events::{EventBus, OrchestratorEvent};
use crate::models::{AgentMessage, ApprovalDecision, ApprovalRequest};
use crate::registry::{AgentEntry, AgentRegistry};
use crate::store::{InMemoryRunStore, RunStore, WorkflowStore};
use crate::workflow::{
    ActionDispatcher, RecordingActionDispatcher, RunStatus, WorkflowDefinition, WorkflowExecutor,
    WorkflowRun,
};

/// Handle to a run whose executor task is still alive.
struct ActiveRun {
    cancel: CancellationToken,
    updates: watch::Receiver<WorkflowRun>,
}

#[derive(Default)]
struct OrchestratorInner {
    active_runs: HashMap<String, ActiveRun>,
}

pub struct Orchestrator {
    inner: Arc<RwLock<OrchestratorInner>>,
    config: Arc<OrchestratorConfig>,
    registry: Arc<AgentRegistry>,
    approvals: Arc<ApprovalBroker>,
    dispatcher: MessageDispatcher,
    store: Arc<dyn RunStore>,
    workflows: WorkflowStore,
    executor: WorkflowExecutor,
    event_bus: EventBus,
}

impl Orchestrator {
    /// Orchestrator over `registry` with in-memory run storage and the
    /// recording action dispatcher. Must be called within a Tokio runtime.
    pub fn new(config: OrchestratorConfig, registry: AgentRegistry) -> Self {
        Self::with_components(
            config,
            Arc::new(registry),
            Arc::new(InMemoryRunStore::new()),
            Arc::new(RecordingActionDispatcher::new()),
        )
    }

    /// Orchestrator with the built-in content, social and email agents.
    pub fn with_defaults(config: OrchestratorConfig) -> Self {
        Self::new(config, AgentRegistry::with_default_agents())
    }

    pub fn with_components(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
        store: Arc<dyn RunStore>,
        actions: Arc<dyn ActionDispatcher>,
    ) -> Self {
        let config = Arc::new(config);
        let event_bus = EventBus::new(config.event_capacity);
        let approvals = Arc::new(ApprovalBroker::new(event_bus.clone()));
        let dispatcher = MessageDispatcher::new(registry.clone(), event_bus.clone());
        let executor = WorkflowExecutor::new(
            registry.clone(),
            actions,
            approvals.clone(),
            store.clone(),
            event_bus.clone(),
            config.clone(),
        );
        Self {
            inner: Arc::new(RwLock::new(OrchestratorInner::default())),
            config,
            registry,
            approvals,
            dispatcher,
            store,
            workflows: WorkflowStore::new(),
            executor,
            event_bus,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ─── Runs ──────────────────────────────────────────────────────────────

    /// Validate `definition`, create a pending run and start it in the
    /// background. Step failures are recorded on the run, not returned here.
    pub async fn submit(
        &self,
        definition: WorkflowDefinition,
        input: Value,
    ) -> Result<String, OrchestratorError> {
        definition.validate()?;

        let run = WorkflowRun::new(definition, input);
        let run_id = run.id.clone();
        self.store.put(&run).await?;

        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(run.clone());
        self.inner.write().await.active_runs.insert(
            run_id.clone(),
            ActiveRun {
                cancel: cancel.clone(),
                updates: rx,
            },
        );

        tracing::info!(
            "[Orchestrator] Submitted run {} for workflow {}",
            run_id,
            run.workflow_id()
        );

        let executor = self.executor.clone();
        let inner = self.inner.clone();
        let approvals = self.approvals.clone();
        let store = self.store.clone();
        let id = run_id.clone();
        tokio::spawn(async move {
            let task = tokio::spawn(async move { executor.run(run, cancel, tx).await });
            match task.await {
                Ok(finished) => tracing::debug!(
                    "[Orchestrator] Run {} finished with status {}",
                    id,
                    finished.status
                ),
                Err(e) => {
                    tracing::error!("[Orchestrator] Executor for run {} stopped: {}", id, e);
                    approvals.withdraw_run(&id);
                    abort_stored_run(store.as_ref(), &id, format!("executor stopped: {}", e)).await;
                }
            }
            inner.write().await.active_runs.remove(&id);
        });

        Ok(run_id)
    }

    /// Submit a workflow saved in the catalog.
    pub async fn submit_by_id(&self, workflow_id: &str, input: Value) -> Result<String, OrchestratorError> {
        let definition = self
            .workflows
            .get(workflow_id)
            .await
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;
        self.submit(definition, input).await
    }

    /// Submit and wait for the run to finish.
    pub async fn execute(
        &self,
        definition: WorkflowDefinition,
        input: Value,
    ) -> Result<WorkflowRun, OrchestratorError> {
        let run_id = self.submit(definition, input).await?;
        self.wait(&run_id).await
    }

    /// Resolve with the run's final snapshot once it is terminal.
    pub async fn wait(&self, run_id: &str) -> Result<WorkflowRun, OrchestratorError> {
        let updates = self
            .inner
            .read()
            .await
            .active_runs
            .get(run_id)
            .map(|active| active.updates.clone());

        if let Some(mut updates) = updates {
            if let Ok(run) = updates.wait_for(|run| run.is_terminal()).await {
                return Ok(run.clone());
            }
        }

        // Not active (or the executor went away): the store has the last word.
        let run = self
            .store
            .get(run_id)
            .await?
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.to_string()))?;
        if run.is_terminal() {
            Ok(run)
        } else {
            Err(OrchestratorError::Internal(format!(
                "run {} stopped in status {}",
                run_id, run.status
            )))
        }
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>, OrchestratorError> {
        self.store.get(run_id).await
    }

    pub async fn list_runs(&self) -> Result<Vec<WorkflowRun>, OrchestratorError> {
        self.store.list().await
    }

    pub async fn list_runs_by_status(&self, status: RunStatus) -> Result<Vec<WorkflowRun>, OrchestratorError> {
        self.store.list_by_status(status).await
    }

    pub async fn list_runs_for_workflow(&self, workflow_id: &str) -> Result<Vec<WorkflowRun>, OrchestratorError> {
        self.store.list_by_workflow(workflow_id).await
    }

    /// Request cancellation. The run stops at its next step boundary, or
    /// immediately if it is waiting for approval.
    pub async fn cancel(&self, run_id: &str) -> Result<(), OrchestratorError> {
        let inner = self.inner.read().await;
        if let Some(active) = inner.active_runs.get(run_id) {
            let status = active.updates.borrow().status;
            if status.is_terminal() {
                return Err(OrchestratorError::InvalidTransition {
                    from: status.to_string(),
                    to: RunStatus::Cancelled.to_string(),
                });
            }
            tracing::info!("[Orchestrator] Cancelling run {}", run_id);
            active.cancel.cancel();
            return Ok(());
        }
        drop(inner);

        match self.store.get(run_id).await? {
            Some(run) => Err(OrchestratorError::InvalidTransition {
                from: run.status.to_string(),
                to: RunStatus::Cancelled.to_string(),
            }),
            None => Err(OrchestratorError::RunNotFound(run_id.to_string())),
        }
    }

    /// Drop terminal runs that finished more than `max_age` ago.
    pub async fn cleanup_finished_runs(&self, max_age: chrono::Duration) -> Result<usize, OrchestratorError> {
        let removed = self.store.remove_finished_before(Utc::now() - max_age).await?;
        if removed > 0 {
            tracing::info!("[Orchestrator] Cleaned up {} finished run(s)", removed);
        }
        Ok(removed)
    }

    // ─── Agents & messages ─────────────────────────────────────────────────

    pub fn register_agent(&self, entry: AgentEntry) -> Result<Arc<AgentEntry>, OrchestratorError> {
        self.registry.register(entry)
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<AgentEntry>> {
        self.registry.get(agent_id)
    }

    pub fn agents(&self) -> Vec<Arc<AgentEntry>> {
        self.registry.all()
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Enqueue a message for routing; returns before it is delivered.
    pub fn send_message(&self, message: AgentMessage) -> Result<(), OrchestratorError> {
        self.dispatcher.send(message)
    }

    /// Wait until every message sent so far has been routed.
    pub async fn flush_messages(&self) -> Result<(), OrchestratorError> {
        self.dispatcher.flush().await
    }

    pub fn message_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    // ─── Approvals ─────────────────────────────────────────────────────────

    pub fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.approvals.pending()
    }

    pub fn resolve_approval(
        &self,
        run_id: &str,
        step_id: &str,
        decision: ApprovalDecision,
    ) -> Result<ApprovalRequest, OrchestratorError> {
        self.approvals.resolve_approval(run_id, step_id, decision)
    }

    // ─── Workflow catalog ──────────────────────────────────────────────────

    pub async fn save_workflow(&self, definition: WorkflowDefinition) -> Result<(), OrchestratorError> {
        let workflow_id = definition.id.clone();
        self.workflows.save(definition).await?;
        tracing::info!("[Orchestrator] Saved workflow {}", workflow_id);
        Ok(())
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        self.workflows.get(workflow_id).await
    }

    pub async fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        self.workflows.list().await
    }

    pub async fn delete_workflow(&self, workflow_id: &str) -> bool {
        self.workflows.delete(workflow_id).await
    }

    // ─── Events & lifecycle ────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_bus.subscribe()
    }

    /// Cancel every active run and stop the message dispatcher.
    pub async fn shutdown(&self) {
        let active: Vec<CancellationToken> = self
            .inner
            .read()
            .await
            .active_runs
            .values()
            .map(|a| a.cancel.clone())
            .collect();
        for token in &active {
            token.cancel();
        }
        self.dispatcher.shutdown().await;
        tracing::info!(
            "[Orchestrator] Shut down ({} active run(s) cancelled)",
            active.len()
        );
    }
}

/// Record a run whose executor task died as failed, so readers of the store
/// never see it stuck in a live status.
async fn abort_stored_run(store: &dyn RunStore, run_id: &str, error: String) {
    let mut run = match store.get(run_id).await {
        Ok(Some(run)) => run,
        Ok(None) => return,
        Err(e) => {
            tracing::error!("[Orchestrator] Cannot load run {}: {}", run_id, e);
            return;
        }
    };
    if run.abort(error).is_err() {
        return;
    }
    if let Err(e) = store.put(&run).await {
        tracing::error!("[Orchestrator] Cannot store aborted run {}: {}", run_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentCategory, AgentInfo, AgentStatus, MessageType};
    use crate::tools::{FnTool, ToolDefinition};
    use crate::workflow::WorkflowStep;
    use serde_json::json;
    use std::time::Duration;

    fn orchestrator() -> Orchestrator {
        Orchestrator::with_defaults(OrchestratorConfig::default())
    }

    async fn wait_for_approval_request(events: &mut broadcast::Receiver<OrchestratorEvent>) {
        loop {
            if let OrchestratorEvent::ApprovalRequested { .. } = events.recv().await.unwrap() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_delay_then_action_completes() {
        let orch = orchestrator();
        let definition = WorkflowDefinition::from_json(
            r#"{
                "id": "wf",
                "name": "Publish",
                "steps": [
                    {"id": "s1", "type": "delay", "config": {"durationMs": 0}},
                    {"id": "s2", "type": "action", "config": {"action": "publish"}}
                ]
            }"#,
        )
        .unwrap();

        let run = orch.execute(definition, json!({ "foo": 1 })).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.current_step_index, 2);
        assert!(run.completed_at.is_some());
        let mut keys: Vec<&String> = run.context.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["input", "step_s1_result", "step_s2_result"]);
        assert_eq!(run.context["input"], json!({ "foo": 1 }));
        assert_eq!(
            run.context["step_s2_result"],
            json!({ "action": "publish", "executed": true })
        );
    }

    #[tokio::test]
    async fn test_missing_agent_fails_run() {
        let orch = orchestrator();
        let definition = WorkflowDefinition::new(
            "wf",
            "Broken",
            vec![WorkflowStep::agent("s1", "missing_agent", "generate_post", json!({}))],
        );

        let run = orch.execute(definition, json!({})).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.current_step_index, 0);
        assert!(run.error.as_deref().unwrap().contains("missing_agent"));
        assert_eq!(run.context.len(), 1);
        assert!(run.context.contains_key("input"));
    }

    #[tokio::test]
    async fn test_invalid_definition_rejected_at_submit() {
        let orch = orchestrator();
        let err = orch
            .submit(WorkflowDefinition::new("wf", "Empty", vec![]), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidWorkflow(_)));
        assert!(orch.list_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let orch = orchestrator();
        let definition = WorkflowDefinition::new(
            "wf",
            "Post",
            vec![WorkflowStep::agent(
                "draft",
                "content_agent",
                "generate_post",
                json!({ "platform": "linkedin" }),
            )],
        );

        let a = orch.submit(definition.clone(), json!({ "n": 1 })).await.unwrap();
        let b = orch.submit(definition, json!({ "n": 2 })).await.unwrap();
        assert_ne!(a, b);

        let run_a = orch.wait(&a).await.unwrap();
        let run_b = orch.wait(&b).await.unwrap();
        assert_eq!(run_a.context["input"], json!({ "n": 1 }));
        assert_eq!(run_b.context["input"], json!({ "n": 2 }));
        assert_eq!(run_a.status, RunStatus::Completed);
        assert_eq!(run_b.status, RunStatus::Completed);
        assert_eq!(orch.list_runs_for_workflow("wf").await.unwrap().len(), 2);
        assert_eq!(
            orch.get_agent("content_agent").unwrap().state().get("posts_generated").await,
            Some(json!(2))
        );
    }

    #[tokio::test]
    async fn test_approval_suspends_until_resolved() {
        let orch = orchestrator();
        let mut events = orch.subscribe();
        let definition = WorkflowDefinition::new(
            "wf",
            "Reviewed",
            vec![
                WorkflowStep::approval("review", vec!["editor".to_string()]),
                WorkflowStep::action("publish", "publish"),
            ],
        );

        let run_id = orch.submit(definition, json!({})).await.unwrap();
        wait_for_approval_request(&mut events).await;

        let pending = orch.pending_approvals();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].run_id, run_id);
        assert_eq!(pending[0].approvers, vec!["editor"]);

        orch.resolve_approval(&run_id, "review", ApprovalDecision::approve("editor"))
            .unwrap();
        let run = orch.wait(&run_id).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.step_result("review").unwrap()["approved"], true);
        assert!(run.step_result("publish").is_some());
        assert!(orch.pending_approvals().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_fails_run() {
        let orch = orchestrator();
        let mut events = orch.subscribe();
        let definition = WorkflowDefinition::new(
            "wf",
            "Reviewed",
            vec![
                WorkflowStep::approval("review", vec![]),
                WorkflowStep::action("publish", "publish"),
            ],
        );

        let run_id = orch.submit(definition, json!({})).await.unwrap();
        wait_for_approval_request(&mut events).await;
        orch.resolve_approval(
            &run_id,
            "review",
            ApprovalDecision::reject("legal", Some("needs disclaimer".to_string())),
        )
        .unwrap();

        let run = orch.wait(&run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("Approval rejected at step review by legal"));
        assert!(run.step_result("publish").is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_approval_keeps_partial_context() {
        let orch = orchestrator();
        let mut events = orch.subscribe();
        let definition = WorkflowDefinition::new(
            "wf",
            "Cancelled",
            vec![
                WorkflowStep::action("prepare", "prepare"),
                WorkflowStep::approval("review", vec![]),
                WorkflowStep::action("publish", "publish"),
            ],
        );

        let run_id = orch.submit(definition, json!({ "k": "v" })).await.unwrap();
        wait_for_approval_request(&mut events).await;
        orch.cancel(&run_id).await.unwrap();

        let run = orch.wait(&run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.current_step_index, 1);
        assert!(run.completed_at.is_some());
        assert!(run.step_result("prepare").is_some());
        assert!(run.step_result("review").is_none());
        assert!(orch.pending_approvals().is_empty());

        assert!(matches!(
            orch.cancel(&run_id).await,
            Err(OrchestratorError::InvalidTransition { .. })
        ));
        assert!(matches!(
            orch.cancel("nope").await,
            Err(OrchestratorError::RunNotFound(_))
        ));
    }

    async fn active_run_count(orch: &Orchestrator) -> usize {
        for _ in 0..100 {
            if orch.inner.read().await.active_runs.is_empty() {
                return 0;
            }
            tokio::task::yield_now().await;
        }
        orch.inner.read().await.active_runs.len()
    }

    fn register_renderer<F, Fut>(orch: &Orchestrator, handler: F)
    where
        F: Fn(Value, crate::tools::AgentState) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, crate::tools::ToolError>> + Send + 'static,
    {
        let tool = FnTool::new(ToolDefinition::new("render", "Render an asset"), handler);
        orch.register_agent(
            AgentEntry::new(
                AgentInfo::new("renderer", "Renderer", AgentCategory::Content, "Renders assets"),
                vec![Arc::new(tool)],
            )
            .unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_pending_run() {
        let orch = orchestrator();
        let definition = WorkflowDefinition::new(
            "wf",
            "Never started",
            vec![WorkflowStep::delay("wait", 1_000), WorkflowStep::action("publish", "publish")],
        );

        let run_id = orch.submit(definition, json!({ "k": 1 })).await.unwrap();
        assert_eq!(orch.get_run(&run_id).await.unwrap().unwrap().status, RunStatus::Pending);
        orch.cancel(&run_id).await.unwrap();

        let run = orch.wait(&run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.current_step_index, 0);
        assert!(run.steps.is_empty());
        assert_eq!(run.context.len(), 1);
        assert!(run.completed_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay_keeps_step_result() {
        let orch = orchestrator();
        let definition = WorkflowDefinition::new(
            "wf",
            "Delayed",
            vec![WorkflowStep::delay("wait", 1_000), WorkflowStep::action("publish", "publish")],
        );

        let run_id = orch.submit(definition, json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        orch.cancel(&run_id).await.unwrap();

        let run = orch.wait(&run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.current_step_index, 1);
        assert_eq!(
            run.step_result("wait"),
            Some(&json!({ "durationMs": 1_000, "delayed": true }))
        );
        assert!(run.step_result("publish").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_last_step_is_honoured() {
        let orch = orchestrator();
        let definition = WorkflowDefinition::new("wf", "Single", vec![WorkflowStep::delay("d", 200)]);

        let run_id = orch.submit(definition, json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        orch.cancel(&run_id).await.unwrap();

        let run = orch.wait(&run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.current_step_index, 1);
        assert!(run.step_result("d").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_tool_call_lets_it_finish() {
        let orch = orchestrator();
        register_renderer(&orch, |_params, _state| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(json!({ "rendered": true }))
        });
        let definition = WorkflowDefinition::new(
            "wf",
            "Render",
            vec![
                WorkflowStep::agent("render", "renderer", "render", json!({})),
                WorkflowStep::action("publish", "publish"),
            ],
        );

        let run_id = orch.submit(definition, json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(orch.get_agent("renderer").unwrap().status(), AgentStatus::Running);
        orch.cancel(&run_id).await.unwrap();

        let run = orch.wait(&run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.current_step_index, 1);
        assert_eq!(run.step_result("render"), Some(&json!({ "rendered": true })));
        assert!(run.step_result("publish").is_none());
        assert_eq!(orch.get_agent("renderer").unwrap().status(), AgentStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_delay_does_not_block_other_runs() {
        let orch = orchestrator();
        let slow = orch
            .submit(
                WorkflowDefinition::new("slow", "Slow", vec![WorkflowStep::delay("wait", 60_000)]),
                json!({}),
            )
            .await
            .unwrap();
        let fast = orch
            .submit(
                WorkflowDefinition::new("fast", "Fast", vec![WorkflowStep::action("go", "publish")]),
                json!({}),
            )
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let fast_run = orch.wait(&fast).await.unwrap();
        assert_eq!(fast_run.status, RunStatus::Completed);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(orch.get_run(&slow).await.unwrap().unwrap().status, RunStatus::Running);

        let slow_run = orch.wait(&slow).await.unwrap();
        assert_eq!(slow_run.status, RunStatus::Completed);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_panicking_tool_fails_run_and_releases_it() {
        let orch = orchestrator();
        register_renderer(&orch, |_params, _state| async move {
            let frames: Vec<Value> = Vec::new();
            Ok(frames[1].clone())
        });
        let definition = WorkflowDefinition::new(
            "wf",
            "Render",
            vec![WorkflowStep::agent("render", "renderer", "render", json!({}))],
        );

        let run_id = orch.submit(definition, json!({})).await.unwrap();
        let run = orch.wait(&run_id).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.as_deref().unwrap().contains("aborted"));
        assert_eq!(
            orch.get_run(&run_id).await.unwrap().unwrap().status,
            RunStatus::Failed
        );
        assert_eq!(orch.get_agent("renderer").unwrap().status(), AgentStatus::Error);
        assert_eq!(active_run_count(&orch).await, 0);
        assert!(matches!(
            orch.cancel(&run_id).await,
            Err(OrchestratorError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_decision_wins_over_simultaneous_cancel() {
        let orch = orchestrator();
        let mut events = orch.subscribe();
        let definition = WorkflowDefinition::new(
            "wf",
            "Reviewed",
            vec![
                WorkflowStep::approval("review", vec![]),
                WorkflowStep::action("publish", "publish"),
            ],
        );

        let run_id = orch.submit(definition, json!({})).await.unwrap();
        wait_for_approval_request(&mut events).await;
        let resolved = orch
            .resolve_approval(&run_id, "review", ApprovalDecision::approve("editor"))
            .unwrap();
        orch.cancel(&run_id).await.unwrap();

        let run = orch.wait(&run_id).await.unwrap();
        assert_eq!(resolved.reviewed_by.as_deref(), Some("editor"));
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.current_step_index, 1);
        assert_eq!(run.step_result("review").unwrap()["approved"], true);
        assert!(run.step_result("publish").is_none());
    }

    #[tokio::test]
    async fn test_catalog_submit_by_id() {
        let orch = orchestrator();
        orch.save_workflow(WorkflowDefinition::new(
            "newsletter",
            "Newsletter",
            vec![WorkflowStep::agent(
                "send",
                "email_agent",
                "send_campaign",
                json!({ "campaign_id": "c1", "audience_id": "all" }),
            )],
        ))
        .await
        .unwrap();

        let run_id = orch.submit_by_id("newsletter", json!({})).await.unwrap();
        let run = orch.wait(&run_id).await.unwrap();
        assert_eq!(
            run.step_result("send"),
            Some(&json!({ "sent": true, "recipients": 1500 }))
        );
        assert!(matches!(
            orch.submit_by_id("unknown", json!({})).await,
            Err(OrchestratorError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unroutable_message_is_noop() {
        let orch = orchestrator();
        orch.send_message(AgentMessage::new("content_agent", "seo", MessageType::Request, json!({})))
            .unwrap();
        orch.flush_messages().await.unwrap();

        assert_eq!(orch.message_stats(), DispatchStats { delivered: 0, dropped: 1 });
        for agent in orch.agents() {
            assert_eq!(agent.pending_messages(), 0);
        }
    }

    #[tokio::test]
    async fn test_cleanup_and_status_listing() {
        let orch = orchestrator();
        let run = orch
            .execute(
                WorkflowDefinition::new("wf", "Quick", vec![WorkflowStep::delay("d", 0)]),
                json!({}),
            )
            .await
            .unwrap();

        let completed = orch.list_runs_by_status(RunStatus::Completed).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(orch.cleanup_finished_runs(chrono::Duration::hours(1)).await.unwrap(), 0);
        assert_eq!(orch.cleanup_finished_runs(chrono::Duration::seconds(-1)).await.unwrap(), 1);
        assert!(orch.get_run(&run.id).await.unwrap().is_none());
    }
}
