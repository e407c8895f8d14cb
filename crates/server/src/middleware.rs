//! Peer identity resolution middleware (§4.4).
//!
//! Keeps the teacher's shape (a state struct plus `from_fn_with_state`
//! inserting an `Extension`) but resolves identity the way Buckley
//! requires: mTLS common name, bearer token, or the loopback-only
//! insecure-local fallback, instead of tenant-scoped JWT claims.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use buckley_auth::{resolve_peer_identity, InsecureLocalHints, TokenManager, TransportIdentity};
use chrono::Utc;

use crate::context::PeerContext;

const AGENT_ID_HEADER: &str = "x-buckley-agent-id";
const CLIENT_CERT_CN_HEADER: &str = "x-buckley-client-cert-cn";

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<TokenManager>,
    pub allow_insecure_local: bool,
}

/// Resolves peer identity from the transport and inserts a [`PeerContext`].
/// The request body, not yet parsed here, is checked for cross-field
/// consistency (§4.4) by individual handlers via `buckley_auth::check_agent_consistency`.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let headers = req.headers().clone();
    let header_agent_id = headers.get(AGENT_ID_HEADER).and_then(|v| v.to_str().ok());

    let (agent_id, capabilities) = if let Some(token) = extract_bearer(&headers) {
        let claims = state.tokens.validate(token, Utc::now()).await.map_err(|_| StatusCode::UNAUTHORIZED)?;
        (claims.agent_id, claims.capabilities)
    } else {
        let transport = match headers.get(CLIENT_CERT_CN_HEADER).and_then(|v| v.to_str().ok()) {
            Some(cn) if !cn.is_empty() => TransportIdentity::Mtls { common_name: cn.to_string() },
            _ => TransportIdentity::Plaintext { peer_addr: peer_addr.ip() },
        };
        let hints = InsecureLocalHints { header_agent_id, body_agent_id: None };
        let resolved = resolve_peer_identity(&transport, state.allow_insecure_local, hints).map_err(|_| StatusCode::UNAUTHORIZED)?;
        (resolved.as_str().to_string(), Vec::new())
    };

    req.extensions_mut().insert(PeerContext::new(agent_id, capabilities));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
