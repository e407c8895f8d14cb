//! `PendingApproval` table (§3, §4.2 tool-execution state machine, §5
//! "ApprovalResult channels have capacity 1 ... sending on an
//! already-resolved channel is a no-op").

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use buckley_core::{BuckleyError, BuckleyResult, RandomToken};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{oneshot, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResult {
    pub approved: bool,
    pub remember: bool,
    pub reason: Option<String>,
}

/// Holds the single-use completion channel. `resolve` takes the sender out
/// of its slot exactly once; a second Approve/Reject/timeout on the same
/// execution is a silent no-op, matching the capacity-1 "select with
/// default" behavior described in §5.
pub struct PendingApproval {
    pub execution_id: RandomToken,
    pub agent_id: String,
    pub tool: String,
    pub parameters: JsonValue,
    pub created_at: DateTime<Utc>,
    sender: StdMutex<Option<oneshot::Sender<ApprovalResult>>>,
}

#[derive(Default)]
pub struct PendingApprovalTable {
    pending: RwLock<HashMap<String, PendingApproval>>,
}

impl PendingApprovalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending approval under a caller-supplied execution id (so the
    /// same id can be reported in the `started` event before the approval
    /// branch is known to be needed) and return the receiver the
    /// tool-execution stream should await on.
    pub async fn create(
        &self,
        execution_id: RandomToken,
        agent_id: impl Into<String>,
        tool: impl Into<String>,
        parameters: JsonValue,
        now: DateTime<Utc>,
    ) -> oneshot::Receiver<ApprovalResult> {
        let (tx, rx) = oneshot::channel();
        let approval = PendingApproval {
            execution_id: execution_id.clone(),
            agent_id: agent_id.into(),
            tool: tool.into(),
            parameters,
            created_at: now,
            sender: StdMutex::new(Some(tx)),
        };
        self.pending.write().await.insert(execution_id.to_string(), approval);
        rx
    }

    /// Resolve a pending approval. Returns `Ok(())` the first time;
    /// `NotFound` if unknown or already resolved/removed.
    pub async fn resolve(&self, execution_id: &str, result: ApprovalResult) -> BuckleyResult<()> {
        let pending = self.pending.read().await;
        let approval = pending
            .get(execution_id)
            .ok_or_else(|| BuckleyError::not_found(format!("pending approval {execution_id}")))?;

        let sender = approval.sender.lock().unwrap().take();
        match sender {
            Some(tx) => {
                // Receiver may already be gone (stream cancelled); that's
                // fine, the send is best-effort per the no-op policy.
                let _ = tx.send(result);
                Ok(())
            }
            None => Err(BuckleyError::not_found(format!("pending approval {execution_id}"))),
        }
    }

    /// Remove the bookkeeping entry once the approval has reached a
    /// terminal state (resolved or timed out).
    pub async fn remove(&self, execution_id: &str) {
        self.pending.write().await.remove(execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_exactly_once() {
        let table = PendingApprovalTable::new();
        let execution_id = RandomToken::generate();
        let rx = table
            .create(execution_id.clone(), "agent-1", "shell", serde_json::json!({}), Utc::now())
            .await;

        table
            .resolve(
                execution_id.as_str(),
                ApprovalResult { approved: true, remember: false, reason: None },
            )
            .await
            .unwrap();

        let result = rx.await.unwrap();
        assert!(result.approved);

        // Second resolve on the same id, before removal, is a no-op error.
        let second = table
            .resolve(
                execution_id.as_str(),
                ApprovalResult { approved: false, remember: false, reason: None },
            )
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn resolve_unknown_execution_is_not_found() {
        let table = PendingApprovalTable::new();
        let result = table
            .resolve("nonexistent", ApprovalResult { approved: true, remember: false, reason: None })
            .await;
        assert!(result.is_err());
    }
}
