//! Message dispatcher: routes `AgentMessage`s to agent inboxes.
//!
//! `send` only enqueues. A single consumer task owns the queue and processes
//! messages in FIFO order:
//! - `to_agent == "orchestrator"` → published as an `OrchestratorMessage` event
//! - `to_agent` names a category with a registered agent → pushed to the first
//!   such agent's inbox
//! - anything else → dropped, logged and counted

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::OrchestratorError;
use crate::events::{EventBus, OrchestratorEvent};
use crate::models::AgentMessage;
use crate::registry::AgentRegistry;

enum Command {
    Deliver(AgentMessage),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    pub delivered: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

pub struct MessageDispatcher {
    tx: mpsc::UnboundedSender<Command>,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MessageDispatcher {
    /// Spawn the consumer task. Must be called within a Tokio runtime.
    pub fn new(registry: Arc<AgentRegistry>, events: EventBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_consumer(rx, registry, events, counters.clone()));
        Self {
            tx,
            counters,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueue a message without waiting for it to be routed.
    pub fn send(&self, message: AgentMessage) -> Result<(), OrchestratorError> {
        self.tx
            .send(Command::Deliver(message))
            .map_err(|_| OrchestratorError::Internal("message dispatcher is shut down".to_string()))
    }

    /// Resolve once every message sent before this call has been routed.
    pub async fn flush(&self) -> Result<(), OrchestratorError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(done_tx))
            .map_err(|_| OrchestratorError::Internal("message dispatcher is shut down".to_string()))?;
        done_rx
            .await
            .map_err(|_| OrchestratorError::Internal("message dispatcher stopped".to_string()))
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::SeqCst),
            dropped: self.counters.dropped.load(Ordering::SeqCst),
        }
    }

    /// Drain the queue and stop the consumer. Later sends fail.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl Drop for MessageDispatcher {
    fn drop(&mut self) {
        if let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            worker.abort();
        }
    }
}

async fn run_consumer(
    mut rx: mpsc::UnboundedReceiver<Command>,
    registry: Arc<AgentRegistry>,
    events: EventBus,
    counters: Arc<Counters>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Deliver(message) => route(message, &registry, &events, &counters),
            Command::Flush(done) => {
                let _ = done.send(());
            }
            Command::Shutdown(done) => {
                rx.close();
                // Drain whatever was queued before the channel closed.
                while let Some(command) = rx.recv().await {
                    match command {
                        Command::Deliver(message) => route(message, &registry, &events, &counters),
                        Command::Flush(done) | Command::Shutdown(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                tracing::debug!("[Dispatcher] Stopped");
                let _ = done.send(());
                return;
            }
        }
    }
}

fn route(message: AgentMessage, registry: &AgentRegistry, events: &EventBus, counters: &Counters) {
    if message.is_for_orchestrator() {
        tracing::debug!(
            "[Dispatcher] Message {} from {} addressed to orchestrator",
            message.id,
            message.from_agent
        );
        counters.delivered.fetch_add(1, Ordering::SeqCst);
        events.emit(OrchestratorEvent::OrchestratorMessage { message });
        return;
    }

    let target = message
        .target_category()
        .and_then(|category| registry.find_by_category(category));

    match target {
        Some(entry) => {
            tracing::debug!(
                "[Dispatcher] Delivered message {} to {}",
                message.id,
                entry.id()
            );
            let message_id = message.id.clone();
            entry.deliver(message);
            counters.delivered.fetch_add(1, Ordering::SeqCst);
            events.emit(OrchestratorEvent::MessageDelivered {
                message_id,
                agent_id: entry.id().to_string(),
            });
        }
        None => {
            let err = OrchestratorError::UnroutableMessage {
                to: message.to_agent.clone(),
            };
            tracing::warn!("[Dispatcher] Dropping message {}: {}", message.id, err);
            counters.dropped.fetch_add(1, Ordering::SeqCst);
            events.emit(OrchestratorEvent::MessageDropped {
                message_id: message.id,
                to_agent: message.to_agent,
            });
        }
    }
}
