//! Bearer token manager used when mTLS is not the transport (§4.4).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_REVOCATION_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerClaims {
    pub agent_id: String,
    pub capabilities: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token has been revoked")]
    Revoked,
    #[error("malformed token: {0}")]
    Malformed(String),
}

/// Issues, validates, revokes, and refreshes bearer tokens. Grounded on the
/// teacher's `Hs256JwtValidator`: signature + expiry verification split
/// from the revocation-set lookup, which is this manager's own state.
pub struct TokenManager {
    secret: Vec<u8>,
    revoked: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl TokenManager {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue(&self, agent_id: impl Into<String>, capabilities: Vec<String>, now: DateTime<Utc>) -> String {
        let claims = BearerClaims {
            agent_id: agent_id.into(),
            capabilities,
            issued_at: now,
            expires_at: now + Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            id: buckley_core::RandomToken::generate().to_string(),
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &BearerClaims) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .expect("encoding bearer claims")
    }

    fn decode(&self, token: &str) -> Result<BearerClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        jsonwebtoken::decode::<BearerClaims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Malformed(e.to_string()))
    }

    pub async fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<BearerClaims, TokenError> {
        let claims = self.decode(token)?;
        if now >= claims.expires_at {
            return Err(TokenError::Expired);
        }
        if self.revoked.read().await.contains_key(&claims.id) {
            return Err(TokenError::Revoked);
        }
        Ok(claims)
    }

    pub async fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<(), TokenError> {
        let claims = self.decode(token)?;
        self.revoked.write().await.insert(claims.id, now);
        Ok(())
    }

    /// Validate `old_token`, revoke it, and issue a fresh token preserving
    /// `agent_id` and `capabilities`.
    pub async fn refresh(&self, old_token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = self.validate(old_token, now).await?;
        self.revoked.write().await.insert(claims.id.clone(), now);
        Ok(self.issue(claims.agent_id, claims.capabilities, now))
    }

    /// Drop revocation entries older than `retention`. Called periodically
    /// (§5 "periodic timers").
    pub async fn cleanup_revocations(&self, now: DateTime<Utc>, retention: Duration) {
        self.revoked.write().await.retain(|_, revoked_at| now - *revoked_at < retention);
    }

    pub fn default_revocation_retention() -> Duration {
        Duration::hours(DEFAULT_REVOCATION_RETENTION_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issue_then_validate_round_trips() {
        let manager = TokenManager::new(b"secret".to_vec());
        let now = Utc::now();
        let token = manager.issue("agent-1", vec!["write_files".to_string()], now);
        let claims = manager.validate(&token, now).await.unwrap();
        assert_eq!(claims.agent_id, "agent-1");
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let manager = TokenManager::new(b"secret".to_vec());
        let now = Utc::now();
        let token = manager.issue("agent-1", vec![], now);
        let later = now + Duration::hours(25);
        let result = manager.validate(&token, later).await;
        assert_eq!(result, Err(TokenError::Expired));
    }

    #[tokio::test]
    async fn revoked_token_is_rejected() {
        let manager = TokenManager::new(b"secret".to_vec());
        let now = Utc::now();
        let token = manager.issue("agent-1", vec![], now);
        manager.revoke(&token, now).await.unwrap();
        let result = manager.validate(&token, now).await;
        assert_eq!(result, Err(TokenError::Revoked));
    }

    #[tokio::test]
    async fn refresh_preserves_agent_and_capabilities_and_revokes_old() {
        let manager = TokenManager::new(b"secret".to_vec());
        let now = Utc::now();
        let token = manager.issue("agent-1", vec!["write_files".to_string()], now);

        let refreshed = manager.refresh(&token, now).await.unwrap();
        let claims = manager.validate(&refreshed, now).await.unwrap();
        assert_eq!(claims.agent_id, "agent-1");
        assert_eq!(claims.capabilities, vec!["write_files".to_string()]);

        let old_result = manager.validate(&token, now).await;
        assert_eq!(old_result, Err(TokenError::Revoked));
    }

    #[tokio::test]
    async fn cleanup_drops_old_revocations() {
        let manager = TokenManager::new(b"secret".to_vec());
        let now = Utc::now();
        let token = manager.issue("agent-1", vec![], now);
        manager.revoke(&token, now).await.unwrap();

        let much_later = now + Duration::hours(48);
        manager
            .cleanup_revocations(much_later, TokenManager::default_revocation_retention())
            .await;

        assert!(manager.revoked.read().await.is_empty());
    }
}
