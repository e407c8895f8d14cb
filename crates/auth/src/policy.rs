//! Capability-scoped tool policy and per-agent audit trail (§4.4).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

const AUDIT_RING_CAPACITY: usize = 256;

/// Maps a capability to the tool names it unlocks. The `admin` capability
/// is handled specially: it always allows every tool, regardless of what
/// (if anything) is configured for it here.
#[derive(Debug, Clone, Default)]
pub struct ToolPolicy {
    capability_tools: HashMap<String, Vec<String>>,
}

impl ToolPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, capability: impl Into<String>, tool: impl Into<String>) -> Self {
        self.capability_tools
            .entry(capability.into())
            .or_default()
            .push(tool.into());
        self
    }

    /// A tool is allowed iff some held capability's policy lists it, or the
    /// peer holds `admin`.
    pub fn is_allowed(&self, peer_capabilities: &[String], tool: &str) -> bool {
        if peer_capabilities.iter().any(|c| c == "admin") {
            return true;
        }
        peer_capabilities.iter().any(|capability| {
            self.capability_tools
                .get(capability)
                .map(|tools| tools.iter().any(|t| t == tool))
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub outcome: AuditOutcome,
}

/// Per-agent bounded ring buffer of policy decisions.
#[derive(Default)]
pub struct AuditLog {
    entries: RwLock<HashMap<String, VecDeque<AuditEntry>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, agent_id: &str, entry: AuditEntry) {
        let mut entries = self.entries.write().await;
        let ring = entries.entry(agent_id.to_string()).or_default();
        if ring.len() >= AUDIT_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    pub async fn for_agent(&self, agent_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .get(agent_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Check the policy for `tool` and record the decision for `agent_id`.
pub async fn check_and_audit(
    policy: &ToolPolicy,
    audit: &AuditLog,
    agent_id: &str,
    peer_capabilities: &[String],
    tool: &str,
    now: DateTime<Utc>,
) -> bool {
    let allowed = policy.is_allowed(peer_capabilities, tool);
    audit
        .record(
            agent_id,
            AuditEntry {
                timestamp: now,
                tool: tool.to_string(),
                outcome: if allowed {
                    AuditOutcome::Allowed
                } else {
                    AuditOutcome::Denied
                },
            },
        )
        .await;
    allowed
}
