//! Workflow executor: drives one run through its steps.
//!
//! Steps run strictly in order. After every state change the executor writes
//! a snapshot to the run store and the run's watch channel, so readers never
//! see a half-applied step.
//!
//! Cancellation is checked at step boundaries. An in-flight tool call or
//! delay always finishes; a pending approval wait is interrupted and its
//! request withdrawn.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::approvals::ApprovalBroker;
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::events::{EventBus, OrchestratorEvent};
use crate::registry::AgentRegistry;
use crate::store::RunStore;
use crate::tools::ToolError;

use super::actions::ActionDispatcher;
use super::condition;
use super::run::WorkflowRun;
use super::schema::{
    ActionStepConfig, AgentStepConfig, ApprovalStepConfig, ConditionStepConfig, DelayStepConfig,
    StepKind, WorkflowStep,
};

enum StepOutcome {
    Completed(Value),
    Cancelled,
}

/// Shared services a run needs. Cheap to clone.
#[derive(Clone)]
pub struct WorkflowExecutor {
    registry: Arc<AgentRegistry>,
    actions: Arc<dyn ActionDispatcher>,
    approvals: Arc<ApprovalBroker>,
    store: Arc<dyn RunStore>,
    events: EventBus,
    config: Arc<OrchestratorConfig>,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        actions: Arc<dyn ActionDispatcher>,
        approvals: Arc<ApprovalBroker>,
        store: Arc<dyn RunStore>,
        events: EventBus,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            registry,
            actions,
            approvals,
            store,
            events,
            config,
        }
    }

    async fn publish(&self, run: &WorkflowRun, updates: &watch::Sender<WorkflowRun>) {
        if let Err(e) = self.store.put(run).await {
            tracing::error!("[Executor] Failed to store snapshot of run {}: {}", run.id, e);
        }
        updates.send_replace(run.clone());
    }

    /// Execute `run` to a terminal status and return the final record.
    pub async fn run(
        &self,
        mut run: WorkflowRun,
        cancel: CancellationToken,
        updates: watch::Sender<WorkflowRun>,
    ) -> WorkflowRun {
        if cancel.is_cancelled() {
            return self.finish_cancelled(run, &updates).await;
        }
        if let Err(e) = run.start() {
            tracing::error!("[Executor] Run {} cannot start: {}", run.id, e);
            return run;
        }
        tracing::info!(
            "[Executor] Run {} started: workflow '{}' with {} step(s)",
            run.id,
            run.definition.name,
            run.definition.steps.len()
        );
        self.events.emit(OrchestratorEvent::RunStarted {
            run_id: run.id.clone(),
            workflow_id: run.workflow_id().to_string(),
            timestamp: run.started_at,
        });
        self.publish(&run, &updates).await;

        while let Some(step) = run.current_step().cloned() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(run, &updates).await;
            }

            let index = run.current_step_index;
            let started_at = Utc::now();
            tracing::debug!(
                "[Executor] Run {} step {}/{}: {} ({})",
                run.id,
                index + 1,
                run.definition.steps.len(),
                step.id,
                step.step_type()
            );
            self.events.emit(OrchestratorEvent::StepStarted {
                run_id: run.id.clone(),
                step_index: index,
                step_id: step.id.clone(),
            });

            match self.execute_step(&mut run, &step, &cancel, &updates).await {
                Ok(StepOutcome::Completed(result)) => {
                    if let Err(e) = run.record_success(&step, result, started_at) {
                        return self.finish_failed(run, &step, e, started_at, &updates).await;
                    }
                    self.events.emit(OrchestratorEvent::StepCompleted {
                        run_id: run.id.clone(),
                        step_index: index,
                        step_id: step.id.clone(),
                    });
                    self.publish(&run, &updates).await;
                }
                Ok(StepOutcome::Cancelled) => {
                    return self.finish_cancelled(run, &updates).await;
                }
                Err(e) => {
                    return self.finish_failed(run, &step, e, started_at, &updates).await;
                }
            }
        }

        // A cancel that lands during the last step still wins over completion.
        if cancel.is_cancelled() {
            return self.finish_cancelled(run, &updates).await;
        }
        if let Err(e) = run.complete() {
            tracing::error!("[Executor] Run {} cannot complete: {}", run.id, e);
        }
        tracing::info!(
            "[Executor] Run {} completed in {}ms",
            run.id,
            run.execution_time_ms.unwrap_or_default()
        );
        self.events.emit(OrchestratorEvent::RunCompleted {
            run_id: run.id.clone(),
            execution_time_ms: run.execution_time_ms.unwrap_or_default(),
        });
        self.publish(&run, &updates).await;
        run
    }

    async fn finish_cancelled(
        &self,
        mut run: WorkflowRun,
        updates: &watch::Sender<WorkflowRun>,
    ) -> WorkflowRun {
        if let Err(e) = run.cancel() {
            tracing::warn!("[Executor] Run {} cannot be cancelled: {}", run.id, e);
            return run;
        }
        tracing::info!(
            "[Executor] Run {} cancelled at step index {}",
            run.id,
            run.current_step_index
        );
        self.events.emit(OrchestratorEvent::RunCancelled {
            run_id: run.id.clone(),
            step_index: run.current_step_index,
        });
        self.publish(&run, updates).await;
        run
    }

    async fn finish_failed(
        &self,
        mut run: WorkflowRun,
        step: &WorkflowStep,
        error: OrchestratorError,
        started_at: DateTime<Utc>,
        updates: &watch::Sender<WorkflowRun>,
    ) -> WorkflowRun {
        let message = error.to_string();
        tracing::warn!("[Executor] Run {} failed at step {}: {}", run.id, step.id, message);
        if let Err(e) = run.fail(step, message.clone(), started_at) {
            tracing::error!("[Executor] Run {} cannot be marked failed: {}", run.id, e);
            return run;
        }
        self.events.emit(OrchestratorEvent::StepFailed {
            run_id: run.id.clone(),
            step_index: run.current_step_index,
            step_id: step.id.clone(),
            error: message.clone(),
        });
        self.events.emit(OrchestratorEvent::RunFailed {
            run_id: run.id.clone(),
            step_index: run.current_step_index,
            error: message,
        });
        self.publish(&run, updates).await;
        run
    }

    async fn execute_step(
        &self,
        run: &mut WorkflowRun,
        step: &WorkflowStep,
        cancel: &CancellationToken,
        updates: &watch::Sender<WorkflowRun>,
    ) -> Result<StepOutcome, OrchestratorError> {
        match &step.kind {
            StepKind::Agent(cfg) => self.execute_agent(step, cfg).await.map(StepOutcome::Completed),
            StepKind::Delay(cfg) => Ok(StepOutcome::Completed(self.execute_delay(cfg).await)),
            StepKind::Condition(cfg) => Ok(StepOutcome::Completed(execute_condition(run, cfg))),
            StepKind::Action(cfg) => self.execute_action(step, cfg).await.map(StepOutcome::Completed),
            StepKind::Approval(cfg) => self.execute_approval(run, step, cfg, cancel, updates).await,
        }
    }

    async fn execute_agent(
        &self,
        step: &WorkflowStep,
        cfg: &AgentStepConfig,
    ) -> Result<Value, OrchestratorError> {
        let entry = self
            .registry
            .get(&cfg.agent_id)
            .ok_or_else(|| OrchestratorError::AgentNotFound(cfg.agent_id.clone()))?;
        let tool = entry.tool(&cfg.tool).ok_or_else(|| OrchestratorError::ToolNotFound {
            agent: cfg.agent_id.clone(),
            tool: cfg.tool.clone(),
        })?;

        let params = Value::Object(cfg.params.clone());
        entry.begin_call();
        let result = match tool.definition().validate(&params) {
            Ok(()) => {
                // Tools are opaque; run them on their own task so a panic
                // fails the step instead of the whole run.
                let owner = entry.clone();
                let call = tokio::spawn(async move { tool.execute(params, owner.state()).await });
                match call.await {
                    Ok(result) => result,
                    Err(e) => Err(ToolError::Failed(format!("tool '{}' aborted: {}", cfg.tool, e))),
                }
            }
            Err(e) => Err(e),
        };

        entry.end_call(result.is_ok());
        result.map_err(|e| OrchestratorError::StepExecution {
            step_id: step.id.clone(),
            message: e.to_string(),
        })
    }

    async fn execute_delay(&self, cfg: &DelayStepConfig) -> Value {
        let duration_ms = match self.config.max_delay_ms {
            Some(max) if cfg.duration_ms > max => {
                tracing::debug!(
                    "[Executor] Clamping delay of {}ms to {}ms",
                    cfg.duration_ms,
                    max
                );
                max
            }
            _ => cfg.duration_ms,
        };
        if duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }
        json!({ "durationMs": duration_ms, "delayed": true })
    }

    async fn execute_action(
        &self,
        step: &WorkflowStep,
        cfg: &ActionStepConfig,
    ) -> Result<Value, OrchestratorError> {
        self.actions
            .execute_action(&cfg.action, &cfg.params)
            .await
            .map_err(|e| OrchestratorError::StepExecution {
                step_id: step.id.clone(),
                message: e.to_string(),
            })
    }

    async fn execute_approval(
        &self,
        run: &mut WorkflowRun,
        step: &WorkflowStep,
        cfg: &ApprovalStepConfig,
        cancel: &CancellationToken,
        updates: &watch::Sender<WorkflowRun>,
    ) -> Result<StepOutcome, OrchestratorError> {
        if cfg.auto_approve.unwrap_or(self.config.auto_approve) {
            tracing::debug!("[Executor] Run {} step {} auto-approved", run.id, step.id);
            return Ok(StepOutcome::Completed(
                json!({ "approved": true, "autoApproved": true }),
            ));
        }

        let (_, decision_rx) = self.approvals.request_approval(
            &run.id,
            run.workflow_id(),
            &step.id,
            cfg.approvers.clone(),
        )?;
        run.wait_for_approval()?;
        self.publish(run, updates).await;

        let timeout_ms = cfg.timeout_ms.or(self.config.approval_timeout_ms);
        let timeout = async {
            match timeout_ms {
                Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                None => std::future::pending::<()>().await,
            }
        };

        // A decision that is already in wins over a cancel or timeout.
        let decision = tokio::select! {
            biased;
            decision = decision_rx => decision,
            _ = cancel.cancelled() => {
                self.approvals.withdraw(&run.id, &step.id);
                return Ok(StepOutcome::Cancelled);
            }
            _ = timeout => {
                self.approvals.withdraw(&run.id, &step.id);
                return Err(OrchestratorError::ApprovalTimeout { step_id: step.id.clone() });
            }
        };

        let decision = decision.map_err(|_| {
            OrchestratorError::Internal(format!("approval for step {} was dropped", step.id))
        })?;
        if !decision.approved {
            return Err(OrchestratorError::ApprovalRejected {
                step_id: step.id.clone(),
                reviewer: decision.reviewer,
            });
        }

        run.resume()?;
        Ok(StepOutcome::Completed(json!({
            "approved": true,
            "autoApproved": false,
            "reviewedBy": decision.reviewer,
            "comments": decision.comments,
        })))
    }
}

fn execute_condition(run: &WorkflowRun, cfg: &ConditionStepConfig) -> Value {
    let result = condition::evaluate(cfg.condition.as_deref(), &run.context);
    json!({
        "condition": cfg.condition,
        "evaluated": true,
        "result": result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentCategory, AgentInfo, AgentStatus, ApprovalDecision};
    use crate::registry::AgentEntry;
    use crate::store::InMemoryRunStore;
    use crate::tools::{FnTool, ParamSpec, ParamType, ToolDefinition, ToolError};
    use crate::workflow::{RecordingActionDispatcher, RunStatus, WorkflowDefinition};

    struct Harness {
        executor: WorkflowExecutor,
        registry: Arc<AgentRegistry>,
        approvals: Arc<ApprovalBroker>,
    }

    fn harness(config: OrchestratorConfig) -> Harness {
        let events = EventBus::default();
        let registry = Arc::new(AgentRegistry::with_default_agents());
        let approvals = Arc::new(ApprovalBroker::new(events.clone()));
        let executor = WorkflowExecutor::new(
            registry.clone(),
            Arc::new(RecordingActionDispatcher::new()),
            approvals.clone(),
            Arc::new(InMemoryRunStore::new()),
            events,
            Arc::new(config),
        );
        Harness {
            executor,
            registry,
            approvals,
        }
    }

    async fn execute(h: &Harness, steps: Vec<WorkflowStep>, input: Value) -> WorkflowRun {
        let run = WorkflowRun::new(WorkflowDefinition::new("wf", "Test", steps), input);
        let (tx, _rx) = watch::channel(run.clone());
        h.executor.run(run, CancellationToken::new(), tx).await
    }

    #[tokio::test]
    async fn test_agent_step_runs_tool_with_config() {
        let h = harness(OrchestratorConfig::default());
        let run = execute(
            &h,
            vec![WorkflowStep::agent(
                "draft",
                "content_agent",
                "generate_post",
                json!({ "platform": "twitter", "topic": "launch day" }),
            )],
            json!({}),
        )
        .await;

        assert_eq!(run.status, RunStatus::Completed);
        let result = run.step_result("draft").unwrap();
        assert_eq!(result["content"], "Generated post for twitter");
        let agent = h.registry.get("content_agent").unwrap();
        assert_eq!(agent.status(), AgentStatus::Idle);
        assert_eq!(agent.state().get("last_topic").await, Some(json!("launch day")));
    }

    #[tokio::test]
    async fn test_tool_failure_marks_agent_error() {
        let h = harness(OrchestratorConfig::default());
        let failing = FnTool::new(
            ToolDefinition::new("explode", "Always fails"),
            |_params, _state| async move { Err(ToolError::Failed("quota exceeded".to_string())) },
        );
        h.registry
            .register(
                AgentEntry::new(
                    AgentInfo::new("flaky", "Flaky", AgentCategory::Analytics, ""),
                    vec![Arc::new(failing)],
                )
                .unwrap(),
            )
            .unwrap();

        let run = execute(
            &h,
            vec![
                WorkflowStep::delay("first", 0),
                WorkflowStep::agent("boom", "flaky", "explode", json!({})),
                WorkflowStep::action("never", "publish"),
            ],
            json!({}),
        )
        .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.current_step_index, 1);
        assert_eq!(run.error.as_deref(), Some("Step boom failed: quota exceeded"));
        assert!(run.step_result("never").is_none());
        assert_eq!(h.registry.get("flaky").unwrap().status(), AgentStatus::Error);
    }

    #[tokio::test]
    async fn test_panicking_tool_fails_step() {
        let h = harness(OrchestratorConfig::default());
        let broken = FnTool::new(ToolDefinition::new("render", "Reads past the end"), |_params, _state| async move {
            let rows: Vec<Value> = Vec::new();
            Ok(rows[1].clone())
        });
        h.registry
            .register(
                AgentEntry::new(
                    AgentInfo::new("renderer", "Renderer", AgentCategory::Content, ""),
                    vec![Arc::new(broken)],
                )
                .unwrap(),
            )
            .unwrap();

        let run = execute(
            &h,
            vec![
                WorkflowStep::agent("render", "renderer", "render", json!({})),
                WorkflowStep::action("never", "publish"),
            ],
            json!({}),
        )
        .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.current_step_index, 0);
        assert!(run.error.as_deref().unwrap().contains("tool 'render' aborted"));
        assert!(run.step_result("never").is_none());
        assert_eq!(h.registry.get("renderer").unwrap().status(), AgentStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_last_step_cancels_run() {
        let h = harness(OrchestratorConfig::default());
        let run = WorkflowRun::new(
            WorkflowDefinition::new("wf", "Test", vec![WorkflowStep::delay("wait", 200)]),
            json!({}),
        );
        let (tx, _rx) = watch::channel(run.clone());
        let cancel = CancellationToken::new();
        let executor = h.executor.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { executor.run(run, token, tx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let run = handle.await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.current_step_index, 1);
        assert_eq!(
            run.step_result("wait"),
            Some(&json!({ "durationMs": 200, "delayed": true }))
        );
    }

    #[tokio::test]
    async fn test_invalid_params_fail_step() {
        let h = harness(OrchestratorConfig::default());
        let run = execute(
            &h,
            vec![WorkflowStep::agent("send", "email_agent", "send_campaign", json!({}))],
            json!({}),
        )
        .await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.unwrap().contains("campaign_id"));
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_run() {
        let h = harness(OrchestratorConfig::default());
        let run = execute(
            &h,
            vec![WorkflowStep::agent("s", "social_agent", "post_to_mars", json!({}))],
            json!({}),
        )
        .await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.unwrap().contains("post_to_mars"));
    }

    #[tokio::test]
    async fn test_condition_step_records_without_branching() {
        let h = harness(OrchestratorConfig::default());
        let run = execute(
            &h,
            vec![
                WorkflowStep::condition("check", "${input.score} > 50"),
                WorkflowStep::action("after", "notify"),
            ],
            json!({ "score": 10 }),
        )
        .await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(
            run.step_result("check"),
            Some(&json!({ "condition": "${input.score} > 50", "evaluated": true, "result": false }))
        );
        assert!(run.step_result("after").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_clamped() {
        let h = harness(OrchestratorConfig {
            max_delay_ms: Some(50),
            ..Default::default()
        });
        let run = execute(&h, vec![WorkflowStep::delay("wait", 60_000)], json!({})).await;
        assert_eq!(
            run.step_result("wait"),
            Some(&json!({ "durationMs": 50, "delayed": true }))
        );
    }

    #[tokio::test]
    async fn test_auto_approve_from_config() {
        let h = harness(OrchestratorConfig {
            auto_approve: true,
            ..Default::default()
        });
        let run = execute(&h, vec![WorkflowStep::approval("ok", vec![])], json!({})).await;
        assert_eq!(
            run.step_result("ok"),
            Some(&json!({ "approved": true, "autoApproved": true }))
        );
        assert!(h.approvals.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_approval_timeout_fails_run() {
        let h = harness(OrchestratorConfig {
            approval_timeout_ms: Some(1_000),
            ..Default::default()
        });
        let run = execute(&h, vec![WorkflowStep::approval("review", vec!["editor".to_string()])], json!({})).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("Approval timed out at step review"));
        assert!(h.approvals.pending().is_empty());
    }

    #[tokio::test]
    async fn test_manual_approval_resumes() {
        let h = harness(OrchestratorConfig::default());
        let run = WorkflowRun::new(
            WorkflowDefinition::new(
                "wf",
                "Test",
                vec![WorkflowStep::approval("review", vec!["editor".to_string()])],
            ),
            json!({}),
        );
        let run_id = run.id.clone();
        let (tx, mut rx) = watch::channel(run.clone());
        let executor = h.executor.clone();
        let handle = tokio::spawn(async move { executor.run(run, CancellationToken::new(), tx).await });

        rx.wait_for(|r| r.status == RunStatus::WaitingApproval).await.unwrap();
        h.approvals
            .resolve_approval(&run_id, "review", ApprovalDecision::approve("editor"))
            .unwrap();

        let run = handle.await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.step_result("review").unwrap()["reviewedBy"], "editor");
        assert_eq!(run.step_result("review").unwrap()["autoApproved"], false);
    }
}
