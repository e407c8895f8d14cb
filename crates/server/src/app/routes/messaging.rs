//! Unary messaging (§4.2 "routes to orchestrator if configured, else
//! directly to the LLM; empty/whitespace content rejected").

use std::sync::Arc;

use axum::extract::Extension;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use buckley_core::BuckleyError;

use crate::app::dto::{SendMessageRequest, SendMessageResponse};
use crate::app::errors::buckley_error_to_response;
use crate::app::state::AppState;

pub fn router() -> Router {
    Router::new().route("/", post(send))
}

async fn send(Extension(state): Extension<Arc<AppState>>, Json(req): Json<SendMessageRequest>) -> Response {
    if req.content.trim().is_empty() {
        return buckley_error_to_response(BuckleyError::invalid_argument("message content must not be empty"));
    }

    let routed_to = match &state.config.orchestrator.endpoint {
        Some(endpoint) if !endpoint.is_empty() => "orchestrator",
        _ if state.config.orchestrator.model_manager_configured => "llm",
        _ => {
            return buckley_error_to_response(BuckleyError::failed_precondition(
                "no orchestrator or model manager collaborator configured",
            ));
        }
    };

    Json(SendMessageResponse { routed_to: routed_to.to_string() }).into_response()
}
