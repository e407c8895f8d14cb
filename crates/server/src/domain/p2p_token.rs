//! P2P brokerage tokens (§3 P2P Token, §4.2 P2P brokerage, §8 property 5).
//!
//! The source's token was a bare ULID; per §9's open question we carry
//! `(requester_id, target_id, issued_at, expires_at)` HMAC-signed so a
//! token cannot be forged or replayed for a different pair of agents. The
//! consumed-flag is still tracked in the in-process table; surviving a
//! server restart without losing single-use enforcement would additionally
//! require persisting that table, which is out of scope here.

use std::collections::HashMap;

use buckley_core::RandomToken;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum P2pTokenError {
    #[error("p2p token not found")]
    NotFound,
    #[error("p2p token expired")]
    Expired,
    #[error("p2p token already consumed")]
    Consumed,
    #[error("p2p token signature invalid")]
    BadSignature,
}

#[derive(Debug, Clone, Serialize)]
pub struct P2pToken {
    pub requester_id: String,
    pub target_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    consumed: bool,
}

fn sign(secret: &[u8], requester_id: &str, target_id: &str, issued_at: i64, expires_at: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(requester_id.as_bytes());
    mac.update(b"|");
    mac.update(target_id.as_bytes());
    mac.update(b"|");
    mac.update(issued_at.to_string().as_bytes());
    mac.update(b"|");
    mac.update(expires_at.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub struct P2pTokenTable {
    secret: Vec<u8>,
    tokens: RwLock<HashMap<String, P2pToken>>,
}

impl P2pTokenTable {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a token for `requester_id` to address `target_id`. Returns the
    /// opaque wire token string and its expiry.
    pub async fn issue(&self, requester_id: &str, target_id: &str, ttl: chrono::Duration, now: DateTime<Utc>) -> (String, DateTime<Utc>) {
        let expires_at = now + ttl;
        let signature = sign(&self.secret, requester_id, target_id, now.timestamp(), expires_at.timestamp());
        let nonce = RandomToken::generate();
        let wire = format!("{}.{}", nonce, signature);

        self.tokens.write().await.insert(
            wire.clone(),
            P2pToken {
                requester_id: requester_id.to_string(),
                target_id: target_id.to_string(),
                issued_at: now,
                expires_at,
                consumed: false,
            },
        );
        (wire, expires_at)
    }

    /// Validate and consume a token. A token validates exactly once; the
    /// second validation fails with `Consumed` (§8 property 5).
    pub async fn validate(&self, wire_token: &str, now: DateTime<Utc>) -> Result<P2pToken, P2pTokenError> {
        let mut tokens = self.tokens.write().await;
        let entry = tokens.get_mut(wire_token).ok_or(P2pTokenError::NotFound)?;

        if entry.consumed {
            return Err(P2pTokenError::Consumed);
        }
        if now >= entry.expires_at {
            return Err(P2pTokenError::Expired);
        }

        let expected = sign(
            &self.secret,
            &entry.requester_id,
            &entry.target_id,
            entry.issued_at.timestamp(),
            entry.expires_at.timestamp(),
        );
        let signature = wire_token.split('.').last().unwrap_or_default();
        if signature != expected {
            return Err(P2pTokenError::BadSignature);
        }

        entry.consumed = true;
        Ok(entry.clone())
    }
}
