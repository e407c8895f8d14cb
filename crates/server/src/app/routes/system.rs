//! Unprotected liveness check and an authenticated identity echo.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::context::PeerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(peer): Extension<PeerContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "agent_id": peer.agent_id(),
        "capabilities": peer.capabilities(),
    }))
}
