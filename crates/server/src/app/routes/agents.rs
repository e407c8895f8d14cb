//! Agent lifecycle: register, unregister, get-info, discover (§4.2).

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use buckley_auth::check_agent_consistency;
use buckley_core::BuckleyError;
use buckley_registry::{ServiceInfo, ServiceQuery};
use chrono::Utc;

use crate::app::dto::{DiscoverQuery, DiscoverResponse, RegisterAgentRequest, RegisterAgentResponse};
use crate::app::errors::buckley_error_to_response;
use crate::app::state::AppState;
use crate::context::PeerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register).get(discover))
        .route("/:id", get(get_info).delete(unregister))
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    Extension(peer): Extension<PeerContext>,
    Json(req): Json<RegisterAgentRequest>,
) -> Response {
    if let Err(e) = check_agent_consistency(&buckley_core::AgentId::new(peer.agent_id().to_string()), Some(req.id.as_str()), peer.capabilities()) {
        return buckley_error_to_response(BuckleyError::permission_denied(e.to_string()));
    }
    if req.id.trim().is_empty() || req.endpoint.trim().is_empty() {
        return buckley_error_to_response(BuckleyError::invalid_argument("id and endpoint are required"));
    }
    if state.registry.get(&req.id).await.is_some() {
        return buckley_error_to_response(BuckleyError::already_exists(format!("agent {}", req.id)));
    }
    let max_agents = state.config.coordinator.max_agents as usize;
    if max_agents > 0 && state.registry.snapshot().await.len() >= max_agents {
        return buckley_error_to_response(BuckleyError::resource_exhausted("max-agent count reached"));
    }

    state
        .registry
        .register(ServiceInfo {
            id: req.id.clone(),
            kind: req.kind,
            endpoint: req.endpoint,
            capabilities: req.capabilities.clone(),
            metadata: req.metadata,
            healthy: true,
        })
        .await;

    let session_token = state.tokens.issue(req.id, req.capabilities, Utc::now());
    Json(RegisterAgentResponse { session_token }).into_response()
}

async fn unregister(Extension(state): Extension<Arc<AppState>>, Path(id): Path<String>) -> Response {
    state.registry.unregister(&id).await;
    state.sessions.remove_for_agent(&id).await;
    axum::http::StatusCode::NO_CONTENT.into_response()
}

async fn get_info(Extension(state): Extension<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.registry.get(&id).await {
        Some(info) => Json(info).into_response(),
        None => buckley_error_to_response(BuckleyError::not_found(format!("agent {id}"))),
    }
}

async fn discover(Extension(state): Extension<Arc<AppState>>, Query(query): Query<DiscoverQuery>) -> Response {
    let services = state
        .registry
        .discover(&ServiceQuery {
            kind: query.kind,
            capabilities: query.capabilities,
            tags: query.tags,
        })
        .await;
    Json(DiscoverResponse { services }).into_response()
}
