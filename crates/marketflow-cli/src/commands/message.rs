//! `marketflow message`: Send an inter-agent message through the dispatcher.

use marketflow_core::dispatch::DispatchStats;
use marketflow_core::models::{AgentMessage, MessageType};
use marketflow_core::Orchestrator;
use serde_json::Value;

use super::print_json;

/// Send one message, wait for it to be routed and return dispatcher stats.
pub async fn send(
    orchestrator: &Orchestrator,
    from: &str,
    to: &str,
    message_type: &str,
    payload: Value,
) -> Result<(AgentMessage, DispatchStats), String> {
    let message_type = MessageType::from_str(message_type).ok_or_else(|| {
        format!(
            "Invalid message type: {}. Use request, response, event, or error",
            message_type
        )
    })?;

    let message = AgentMessage::new(from, to, message_type, payload);
    orchestrator
        .send_message(message.clone())
        .map_err(|e| e.to_string())?;
    orchestrator
        .flush_messages()
        .await
        .map_err(|e| e.to_string())?;

    Ok((message, orchestrator.message_stats()))
}

pub async fn run(
    orchestrator: &Orchestrator,
    from: &str,
    to: &str,
    message_type: &str,
    payload: Value,
) -> Result<(), String> {
    let (message, stats) = send(orchestrator, from, to, message_type, payload).await?;
    print_json(&serde_json::json!({
        "messageId": message.id,
        "toAgent": message.to_agent,
        "stats": stats,
    }));
    if stats.dropped > 0 {
        eprintln!("Warning: no agent registered for '{}'; message dropped", to);
    }
    Ok(())
}
