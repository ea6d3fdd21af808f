//! Approval broker: parks approval steps until a reviewer decides.
//!
//! Each pending request is keyed by `(run_id, step_id)` and owns the sending
//! half of a oneshot channel; the waiting executor task holds the receiver.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::oneshot;

use crate::error::OrchestratorError;
use crate::events::{EventBus, OrchestratorEvent};
use crate::models::{ApprovalDecision, ApprovalRequest, ApprovalStatus};

struct PendingApproval {
    request: ApprovalRequest,
    responder: oneshot::Sender<ApprovalDecision>,
}

type ApprovalKey = (String, String);

pub struct ApprovalBroker {
    pending: Mutex<HashMap<ApprovalKey, PendingApproval>>,
    events: EventBus,
}

impl ApprovalBroker {
    pub fn new(events: EventBus) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ApprovalKey, PendingApproval>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a request and return the receiver the run waits on.
    pub fn request_approval(
        &self,
        run_id: &str,
        workflow_id: &str,
        step_id: &str,
        approvers: Vec<String>,
    ) -> Result<(ApprovalRequest, oneshot::Receiver<ApprovalDecision>), OrchestratorError> {
        let key = (run_id.to_string(), step_id.to_string());
        let request = ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
            approvers: approvers.clone(),
            status: ApprovalStatus::Pending,
            requested_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
            comments: None,
        };
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.lock();
            if pending.contains_key(&key) {
                return Err(OrchestratorError::Internal(format!(
                    "approval already pending for run {} step {}",
                    run_id, step_id
                )));
            }
            pending.insert(
                key,
                PendingApproval {
                    request: request.clone(),
                    responder: tx,
                },
            );
        }

        tracing::info!(
            "[Approvals] Requested approval for run {} step {} from {:?}",
            run_id,
            step_id,
            approvers
        );
        self.events.emit(OrchestratorEvent::ApprovalRequested {
            run_id: run_id.to_string(),
            step_id: step_id.to_string(),
            approvers,
        });
        Ok((request, rx))
    }

    /// Deliver a decision to the waiting run.
    pub fn resolve_approval(
        &self,
        run_id: &str,
        step_id: &str,
        decision: ApprovalDecision,
    ) -> Result<ApprovalRequest, OrchestratorError> {
        let not_found = || OrchestratorError::ApprovalNotFound {
            run_id: run_id.to_string(),
            step_id: step_id.to_string(),
        };
        let PendingApproval {
            mut request,
            responder,
        } = self
            .lock()
            .remove(&(run_id.to_string(), step_id.to_string()))
            .ok_or_else(not_found)?;

        request.status = if decision.approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        request.reviewed_by = decision.reviewer.clone();
        request.reviewed_at = Some(Utc::now());
        request.comments = decision.comments.clone();

        let approved = decision.approved;
        if responder.send(decision).is_err() {
            // The run stopped waiting (cancelled or timed out) in the meantime.
            return Err(not_found());
        }

        tracing::info!(
            "[Approvals] Run {} step {} {}",
            run_id,
            step_id,
            if approved { "approved" } else { "rejected" }
        );
        self.events.emit(OrchestratorEvent::ApprovalResolved {
            run_id: run_id.to_string(),
            step_id: step_id.to_string(),
            approved,
        });
        Ok(request)
    }

    /// Drop a pending request without a decision.
    pub fn withdraw(&self, run_id: &str, step_id: &str) -> Option<ApprovalRequest> {
        let removed = self
            .lock()
            .remove(&(run_id.to_string(), step_id.to_string()))
            .map(|p| p.request);
        if removed.is_some() {
            tracing::debug!("[Approvals] Withdrew approval for run {} step {}", run_id, step_id);
        }
        removed
    }

    /// Drop every pending request belonging to `run_id`.
    pub fn withdraw_run(&self, run_id: &str) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|(run, _), _| run != run_id);
        let removed = before - pending.len();
        if removed > 0 {
            tracing::debug!("[Approvals] Withdrew {} approval(s) for run {}", removed, run_id);
        }
        removed
    }

    /// Pending requests, oldest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let mut requests: Vec<ApprovalRequest> =
            self.lock().values().map(|p| p.request.clone()).collect();
        requests.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        requests
    }

    pub fn is_pending(&self, run_id: &str, step_id: &str) -> bool {
        self.lock()
            .contains_key(&(run_id.to_string(), step_id.to_string()))
    }
}
