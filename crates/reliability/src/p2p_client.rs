//! Outbound P2P client (§4.6). Routes every send through a [`CircuitBreaker`].
//!
//! "gRPC-style connection" is realized here as a `reqwest` client bound to a
//! single peer endpoint; sends route through the breaker, a send attempted
//! with no live endpoint is answered with `P2pError::NotConnected` without
//! the breaker observing success or failure.

use std::sync::RwLock;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::breaker::{BreakerConfig, BreakerError, CircuitBreaker};

#[derive(Debug, Error)]
pub enum P2pError {
    #[error("not connected")]
    NotConnected,
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("request failed: {0}")]
    Request(String),
}

impl<E: std::fmt::Display> From<BreakerError<E>> for P2pError {
    fn from(value: BreakerError<E>) -> Self {
        match value {
            BreakerError::CircuitOpen => P2pError::CircuitOpen,
            BreakerError::Inner(err) => P2pError::Request(err.to_string()),
        }
    }
}

pub struct P2pClient {
    http: reqwest::Client,
    endpoint: RwLock<Option<String>>,
    breaker: CircuitBreaker,
}

impl P2pClient {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("building reqwest client"),
            endpoint: RwLock::new(None),
            breaker: CircuitBreaker::new(config),
        }
    }

    pub fn connect(&self, endpoint: impl Into<String>) {
        *self.endpoint.write().unwrap() = Some(endpoint.into());
    }

    pub fn disconnect(&self) {
        *self.endpoint.write().unwrap() = None;
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.read().unwrap().is_some()
    }

    /// Send `payload` to the peer's `path`. Not observed by the breaker at
    /// all when there is no live endpoint.
    pub async fn send<T: Serialize>(&self, path: &str, payload: &T) -> Result<String, P2pError> {
        let endpoint = self
            .endpoint
            .read()
            .unwrap()
            .clone()
            .ok_or(P2pError::NotConnected)?;
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'));

        let http = self.http.clone();
        let body = serde_json::to_string(payload).map_err(|e| P2pError::Request(e.to_string()))?;

        self.breaker
            .call(|| async move {
                let response = http
                    .post(url)
                    .header("content-type", "application/json")
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                if !response.status().is_success() {
                    return Err(format!("peer responded with {}", response.status()));
                }
                response.text().await.map_err(|e| e.to_string())
            })
            .await
            .map_err(P2pError::from)
    }

    pub fn breaker_open(&self) -> bool {
        self.breaker.is_open()
    }
}
