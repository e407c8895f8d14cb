//! Sessions, their mutable context, and content-addressable context handles
//! (§3 Session / ContextHandle, §5 shared-resource policy).

use std::collections::HashMap;

use buckley_core::{BuckleyError, BuckleyResult, HandleId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// File-path -> present mapping plus free-form metadata, as described by
/// the data model. "Present" files are tracked as a set; the value only
/// matters for existence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub files: HashMap<String, bool>,
    pub metadata: HashMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent_id: String,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub context: SessionContext,
}

/// Delta applied by `UpdateContext`: empty metadata values remove the key;
/// `add_files`/`remove_files` add or drop entries from the file set.
#[derive(Debug, Default, Deserialize)]
pub struct ContextDelta {
    #[serde(default)]
    pub add_files: Vec<String>,
    #[serde(default)]
    pub remove_files: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Sessions guarded by their own reader-writer lock, independent of the
/// grants/pending-approvals/context-handle tables (§5).
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, agent_id: impl Into<String>, metadata: HashMap<String, String>, now: DateTime<Utc>) -> Session {
        let session = Session {
            id: SessionId::new(),
            agent_id: agent_id.into(),
            metadata,
            created_at: now,
            context: SessionContext {
                updated_at: now,
                ..Default::default()
            },
        };
        self.sessions.write().await.insert(session.id, session.clone());
        session
    }

    pub async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn update_context(&self, id: SessionId, delta: ContextDelta, now: DateTime<Utc>) -> BuckleyResult<SessionContext> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| BuckleyError::not_found(format!("session {id}")))?;

        for file in delta.add_files {
            session.context.files.insert(file, true);
        }
        for file in delta.remove_files {
            session.context.files.remove(&file);
        }
        for (k, v) in delta.metadata {
            if v.is_empty() {
                session.context.metadata.remove(&k);
            } else {
                session.context.metadata.insert(k, v);
            }
        }
        session.context.updated_at = now;
        Ok(session.context.clone())
    }

    /// Drop every session owned by `agent_id` (an unregistering agent
    /// destroys its sessions, per §3).
    pub async fn remove_for_agent(&self, agent_id: &str) {
        self.sessions.write().await.retain(|_, s| s.agent_id != agent_id);
    }

    pub async fn delete(&self, id: SessionId) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }
}

/// Immutable, content-addressable byte payload (§3 ContextHandle).
#[derive(Debug, Clone, Serialize)]
pub struct ContextHandle {
    pub handle_id: HandleId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub size_bytes: usize,
}

#[derive(Default)]
pub struct ContextHandleTable {
    handles: RwLock<HashMap<HandleId, ContextHandle>>,
}

impl ContextHandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, kind: impl Into<String>, payload: Vec<u8>, now: DateTime<Utc>) -> ContextHandle {
        let handle = ContextHandle {
            handle_id: HandleId::new(),
            kind: kind.into(),
            size_bytes: payload.len(),
            payload,
            created_at: now,
        };
        self.handles.write().await.insert(handle.handle_id, handle.clone());
        handle
    }

    pub async fn resolve(&self, id: HandleId) -> BuckleyResult<ContextHandle> {
        self.handles
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| BuckleyError::not_found(format!("context handle {id}")))
    }

    pub async fn delete(&self, id: HandleId) -> BuckleyResult<()> {
        self.handles
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BuckleyError::not_found(format!("context handle {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_context_empty_value_removes_metadata_key() {
        let table = SessionTable::new();
        let now = Utc::now();
        let session = table.create("agent-1", HashMap::new(), now).await;

        table
            .update_context(
                session.id,
                ContextDelta {
                    metadata: HashMap::from([("k".to_string(), "v".to_string())]),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();

        let ctx = table
            .update_context(
                session.id,
                ContextDelta {
                    metadata: HashMap::from([("k".to_string(), String::new())]),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();

        assert!(!ctx.metadata.contains_key("k"));
    }

    #[tokio::test]
    async fn add_then_remove_file_round_trips() {
        let table = SessionTable::new();
        let now = Utc::now();
        let session = table.create("agent-1", HashMap::new(), now).await;

        let ctx = table
            .update_context(
                session.id,
                ContextDelta {
                    add_files: vec!["a.rs".to_string()],
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert!(ctx.files.contains_key("a.rs"));

        let ctx = table
            .update_context(
                session.id,
                ContextDelta {
                    remove_files: vec!["a.rs".to_string()],
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert!(!ctx.files.contains_key("a.rs"));
    }

    #[tokio::test]
    async fn context_handle_round_trips_then_deletes() {
        let table = ContextHandleTable::new();
        let handle = table.create("blob", b"hello".to_vec(), Utc::now()).await;
        let resolved = table.resolve(handle.handle_id).await.unwrap();
        assert_eq!(resolved.size_bytes, 5);
        table.delete(handle.handle_id).await.unwrap();
        assert!(table.resolve(handle.handle_id).await.is_err());
    }
}
