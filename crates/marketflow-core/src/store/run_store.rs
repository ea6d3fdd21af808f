use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::OrchestratorError;
use crate::workflow::{RunStatus, WorkflowRun};

/// Storage for run snapshots. The executor writes a fresh snapshot after
/// every state change; readers only ever see whole snapshots.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn put(&self, run: &WorkflowRun) -> Result<(), OrchestratorError>;

    async fn get(&self, run_id: &str) -> Result<Option<WorkflowRun>, OrchestratorError>;

    /// All runs, most recently started first.
    async fn list(&self) -> Result<Vec<WorkflowRun>, OrchestratorError>;

    async fn list_by_status(&self, status: RunStatus) -> Result<Vec<WorkflowRun>, OrchestratorError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    async fn list_by_workflow(&self, workflow_id: &str) -> Result<Vec<WorkflowRun>, OrchestratorError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.workflow_id() == workflow_id)
            .collect())
    }

    async fn remove(&self, run_id: &str) -> Result<Option<WorkflowRun>, OrchestratorError>;

    /// Remove terminal runs that completed before `cutoff`; returns how many.
    async fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, OrchestratorError> {
        let mut removed = 0;
        for run in self.list().await? {
            let expired = run.is_terminal() && run.completed_at.is_some_and(|at| at < cutoff);
            if expired && self.remove(&run.id).await?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<String, WorkflowRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn put(&self, run: &WorkflowRun) -> Result<(), OrchestratorError> {
        self.runs.write().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<WorkflowRun>, OrchestratorError> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn list(&self) -> Result<Vec<WorkflowRun>, OrchestratorError> {
        let mut runs: Vec<WorkflowRun> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn remove(&self, run_id: &str) -> Result<Option<WorkflowRun>, OrchestratorError> {
        Ok(self.runs.write().await.remove(run_id))
    }
}
