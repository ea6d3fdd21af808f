use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::OrchestratorError;
use crate::workflow::WorkflowDefinition;

/// Catalog of saved workflow definitions, keyed by id.
#[derive(Debug, Default)]
pub struct WorkflowStore {
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and save a definition, replacing any previous version.
    pub async fn save(&self, definition: WorkflowDefinition) -> Result<(), OrchestratorError> {
        definition.validate()?;
        self.workflows
            .write()
            .await
            .insert(definition.id.clone(), definition);
        Ok(())
    }

    pub async fn get(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        self.workflows.read().await.get(workflow_id).cloned()
    }

    /// Definitions sorted by id.
    pub async fn list(&self) -> Vec<WorkflowDefinition> {
        let mut workflows: Vec<WorkflowDefinition> =
            self.workflows.read().await.values().cloned().collect();
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        workflows
    }

    pub async fn delete(&self, workflow_id: &str) -> bool {
        self.workflows.write().await.remove(workflow_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowStep;

    #[tokio::test]
    async fn test_save_replaces_and_lists_sorted() {
        let store = WorkflowStore::new();
        store
            .save(WorkflowDefinition::new("b", "B", vec![WorkflowStep::delay("d", 0)]))
            .await
            .unwrap();
        store
            .save(WorkflowDefinition::new("a", "A", vec![WorkflowStep::delay("d", 0)]))
            .await
            .unwrap();
        store
            .save(WorkflowDefinition::new("a", "A2", vec![WorkflowStep::delay("d", 0)]))
            .await
            .unwrap();

        let ids: Vec<String> = store.list().await.into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.get("a").await.unwrap().name, "A2");
        assert!(store.delete("b").await);
        assert!(!store.delete("b").await);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid() {
        let store = WorkflowStore::new();
        let err = store
            .save(WorkflowDefinition::new("empty", "Empty", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidWorkflow(_)));
        assert!(store.get("empty").await.is_none());
    }
}
