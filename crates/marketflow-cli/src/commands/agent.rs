//! `marketflow agent`: Inspect registered agents.

use marketflow_core::models::AgentInfo;
use marketflow_core::tools::ToolDefinition;
use marketflow_core::Orchestrator;
use serde::Serialize;

use super::print_json;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    #[serde(flatten)]
    pub info: AgentInfo,
    pub tools: Vec<ToolDefinition>,
    pub pending_messages: usize,
}

/// Registered agents in registration order.
pub fn summaries(orchestrator: &Orchestrator) -> Vec<AgentSummary> {
    orchestrator
        .agents()
        .iter()
        .map(|entry| AgentSummary {
            info: entry.info(),
            tools: entry.tool_definitions(),
            pending_messages: entry.pending_messages(),
        })
        .collect()
}

pub async fn list(orchestrator: &Orchestrator) -> Result<(), String> {
    let agents = serde_json::to_value(summaries(orchestrator)).map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "agents": agents }));
    Ok(())
}
