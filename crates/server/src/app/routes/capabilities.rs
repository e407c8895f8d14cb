//! Capability management: request / revoke grants (§4.2, §4.4).

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use buckley_auth::GrantRequest;
use buckley_core::{BuckleyError, GrantId};
use chrono::Utc;
use std::str::FromStr;

use crate::app::dto::RequestGrantRequest;
use crate::app::errors::buckley_error_to_response;
use crate::app::state::AppState;

pub fn router() -> Router {
    Router::new().route("/", post(request_grant)).route("/:grant_id", delete(revoke_grant))
}

async fn request_grant(Extension(state): Extension<Arc<AppState>>, Json(req): Json<RequestGrantRequest>) -> Response {
    let grant = state
        .grants
        .request(
            GrantRequest {
                agent_id: req.agent_id,
                capabilities: req.capabilities,
                context: req.context,
                expires_at: req.expires_at,
            },
            Utc::now(),
        )
        .await;
    Json(grant).into_response()
}

async fn revoke_grant(Extension(state): Extension<Arc<AppState>>, Path(grant_id): Path<String>) -> Response {
    let Ok(grant_id) = GrantId::from_str(&grant_id) else {
        return buckley_error_to_response(BuckleyError::invalid_argument("malformed grant id"));
    };
    match state.grants.revoke(&grant_id).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(_) => buckley_error_to_response(BuckleyError::not_found(format!("grant {grant_id}"))),
    }
}
