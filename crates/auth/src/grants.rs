//! Capability grants (§3 CapabilityGrant, §4.4).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::RwLock;

use buckley_core::GrantId;

const DEFAULT_GRANT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub grant_id: GrantId,
    pub agent_id: Option<String>,
    pub capabilities: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub context: JsonValue,
}

impl CapabilityGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantError {
    #[error("grant not found")]
    NotFound,
}

/// A request to issue a new grant. `expires_at` defaults to 24 hours from
/// `issued_at` when not supplied.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub agent_id: Option<String>,
    pub capabilities: Vec<String>,
    pub context: JsonValue,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Reader-writer-locked grant table (§5 "dedicated reader-writer lock").
#[derive(Default)]
pub struct GrantStore {
    grants: RwLock<std::collections::HashMap<GrantId, CapabilityGrant>>,
}

impl GrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn request(&self, request: GrantRequest, now: DateTime<Utc>) -> CapabilityGrant {
        let grant = CapabilityGrant {
            grant_id: GrantId::new(),
            agent_id: request.agent_id,
            capabilities: request.capabilities,
            issued_at: now,
            expires_at: request
                .expires_at
                .unwrap_or(now + Duration::hours(DEFAULT_GRANT_TTL_HOURS)),
            context: request.context,
        };
        self.grants.write().await.insert(grant.grant_id.clone(), grant.clone());
        grant
    }

    /// A revoked grant is removed outright: the invariant "never
    /// re-validated" holds trivially, and a second revoke correctly
    /// surfaces `NotFound` (§8 property 6).
    pub async fn revoke(&self, grant_id: &GrantId) -> Result<(), GrantError> {
        let mut grants = self.grants.write().await;
        grants.remove(grant_id).map(|_| ()).ok_or(GrantError::NotFound)
    }

    /// Returns the grant if it exists and is not expired; an expired grant
    /// is evicted as a side effect and reported as `NotFound`.
    pub async fn get_live(&self, grant_id: &GrantId, now: DateTime<Utc>) -> Result<CapabilityGrant, GrantError> {
        let mut grants = self.grants.write().await;
        match grants.get(grant_id) {
            Some(grant) if grant.is_expired(now) => {
                grants.remove(grant_id);
                Err(GrantError::NotFound)
            }
            Some(grant) => Ok(grant.clone()),
            None => Err(GrantError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn revoke_then_get_returns_not_found() {
        let store = GrantStore::new();
        let now = Utc::now();
        let grant = store
            .request(
                GrantRequest {
                    agent_id: Some("agent-1".to_string()),
                    capabilities: vec!["write_files".to_string()],
                    context: json!({}),
                    expires_at: None,
                },
                now,
            )
            .await;

        store.revoke(&grant.grant_id).await.unwrap();
        let result = store.get_live(&grant.grant_id, now).await;
        assert_eq!(result, Err(GrantError::NotFound));
    }

    #[tokio::test]
    async fn revoking_twice_is_not_found_both_times() {
        let store = GrantStore::new();
        let now = Utc::now();
        let grant = store
            .request(
                GrantRequest {
                    agent_id: None,
                    capabilities: vec![],
                    context: json!({}),
                    expires_at: None,
                },
                now,
            )
            .await;

        store.revoke(&grant.grant_id).await.unwrap();
        let second = store.revoke(&grant.grant_id).await;
        assert_eq!(second, Err(GrantError::NotFound));
    }

    #[tokio::test]
    async fn default_expiry_is_24_hours() {
        let store = GrantStore::new();
        let now = Utc::now();
        let grant = store
            .request(
                GrantRequest {
                    agent_id: None,
                    capabilities: vec![],
                    context: json!({}),
                    expires_at: None,
                },
                now,
            )
            .await;
        assert_eq!(grant.expires_at - grant.issued_at, Duration::hours(24));
    }

    #[tokio::test]
    async fn expired_grant_is_not_found() {
        let store = GrantStore::new();
        let now = Utc::now();
        let grant = store
            .request(
                GrantRequest {
                    agent_id: None,
                    capabilities: vec![],
                    context: json!({}),
                    expires_at: Some(now + Duration::seconds(1)),
                },
                now,
            )
            .await;

        let later = now + Duration::seconds(2);
        let result = store.get_live(&grant.grant_id, later).await;
        assert_eq!(result, Err(GrantError::NotFound));
    }
}
