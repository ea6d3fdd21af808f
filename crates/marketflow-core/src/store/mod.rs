pub mod run_store;
pub mod workflow_store;

pub use run_store::{InMemoryRunStore, RunStore};
pub use workflow_store::WorkflowStore;
