//! Session management: create, update-context, context handles (§4.2).

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::Engine;
use buckley_core::{BuckleyError, HandleId, SessionId};
use chrono::Utc;

use crate::app::dto::{CreateContextHandleRequest, CreateSessionRequest};
use crate::app::errors::buckley_error_to_response;
use crate::app::state::AppState;
use crate::domain::session::ContextDelta;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_session))
        .route("/:id", get(get_session).delete(delete_session))
        .route("/:id/context", post(update_context))
        .route("/:id/context-handles", post(create_context_handle))
        .route("/:id/context-handles/:handle_id", get(resolve_context_handle).delete(delete_context_handle))
}

async fn create_session(Extension(state): Extension<Arc<AppState>>, Json(req): Json<CreateSessionRequest>) -> Response {
    if req.agent_id.trim().is_empty() {
        return buckley_error_to_response(BuckleyError::invalid_argument("agent_id is required"));
    }
    let session = state.sessions.create(req.agent_id, req.metadata, Utc::now()).await;
    Json(session).into_response()
}

async fn get_session(Extension(state): Extension<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Ok(id) = SessionId::from_str(&id) else {
        return buckley_error_to_response(BuckleyError::invalid_argument("malformed session id"));
    };
    match state.sessions.get(id).await {
        Some(session) => Json(session).into_response(),
        None => buckley_error_to_response(BuckleyError::not_found(format!("session {id}"))),
    }
}

async fn delete_session(Extension(state): Extension<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Ok(id) = SessionId::from_str(&id) else {
        return buckley_error_to_response(BuckleyError::invalid_argument("malformed session id"));
    };
    if state.sessions.delete(id).await {
        axum::http::StatusCode::NO_CONTENT.into_response()
    } else {
        buckley_error_to_response(BuckleyError::not_found(format!("session {id}")))
    }
}

async fn update_context(Extension(state): Extension<Arc<AppState>>, Path(id): Path<String>, Json(delta): Json<ContextDelta>) -> Response {
    let Ok(id) = SessionId::from_str(&id) else {
        return buckley_error_to_response(BuckleyError::invalid_argument("malformed session id"));
    };
    match state.sessions.update_context(id, delta, Utc::now()).await {
        Ok(context) => Json(context).into_response(),
        Err(e) => buckley_error_to_response(e),
    }
}

async fn create_context_handle(Extension(state): Extension<Arc<AppState>>, Json(req): Json<CreateContextHandleRequest>) -> Response {
    let payload = match base64::engine::general_purpose::STANDARD.decode(req.payload_base64) {
        Ok(bytes) => bytes,
        Err(_) => return buckley_error_to_response(BuckleyError::invalid_argument("payload_base64 is not valid base64")),
    };
    let handle = state.context_handles.create(req.kind, payload, Utc::now()).await;
    Json(handle).into_response()
}

async fn resolve_context_handle(Extension(state): Extension<Arc<AppState>>, Path((_, handle_id)): Path<(String, String)>) -> Response {
    let Ok(handle_id) = HandleId::from_str(&handle_id) else {
        return buckley_error_to_response(BuckleyError::invalid_argument("malformed handle id"));
    };
    match state.context_handles.resolve(handle_id).await {
        Ok(handle) => Json(handle).into_response(),
        Err(e) => buckley_error_to_response(e),
    }
}

async fn delete_context_handle(Extension(state): Extension<Arc<AppState>>, Path((_, handle_id)): Path<(String, String)>) -> Response {
    let Ok(handle_id) = HandleId::from_str(&handle_id) else {
        return buckley_error_to_response(BuckleyError::invalid_argument("malformed handle id"));
    };
    match state.context_handles.delete(handle_id).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => buckley_error_to_response(e),
    }
}
