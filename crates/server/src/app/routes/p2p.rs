//! P2P brokerage (§4.2 "GetP2PEndpoint issues a single-use token scoped to
//! the requester/target pair; EstablishP2PConnection redeems it").

use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use buckley_core::BuckleyError;
use chrono::Utc;

use crate::app::dto::{EstablishP2pConnectionRequest, EstablishP2pConnectionResponse, GetP2pEndpointRequest, GetP2pEndpointResponse};
use crate::app::errors::buckley_error_to_response;
use crate::app::state::AppState;
use crate::domain::P2pTokenError;

/// Per §4.2; tokens are short-lived since they exist only to bridge a single
/// connection attempt.
const P2P_TOKEN_TTL_MINUTES: i64 = 5;

pub fn router() -> Router {
    Router::new()
        .route("/endpoint", post(get_endpoint))
        .route("/connect", post(establish_connection))
}

async fn get_endpoint(Extension(state): Extension<Arc<AppState>>, Query(req): Query<GetP2pEndpointRequest>) -> Response {
    let Some(target) = state.registry.get(&req.target_id).await else {
        return buckley_error_to_response(BuckleyError::not_found(format!("agent {}", req.target_id)));
    };
    if !target.healthy {
        return buckley_error_to_response(BuckleyError::failed_precondition(format!("agent {} is unhealthy", req.target_id)));
    }

    let (token, expires_at) = state
        .p2p_tokens
        .issue(&req.requester_id, &req.target_id, chrono::Duration::minutes(P2P_TOKEN_TTL_MINUTES), Utc::now())
        .await;

    Json(GetP2pEndpointResponse { address: target.endpoint, token, expires_at }).into_response()
}

async fn establish_connection(Extension(state): Extension<Arc<AppState>>, Json(req): Json<EstablishP2pConnectionRequest>) -> Response {
    match state.p2p_tokens.validate(&req.token, Utc::now()).await {
        Ok(token) => Json(EstablishP2pConnectionResponse { requester_id: token.requester_id, target_id: token.target_id }).into_response(),
        Err(P2pTokenError::NotFound) => buckley_error_to_response(BuckleyError::not_found("p2p token")),
        Err(P2pTokenError::Expired) => buckley_error_to_response(BuckleyError::failed_precondition("p2p token expired")),
        Err(P2pTokenError::Consumed) => buckley_error_to_response(BuckleyError::failed_precondition("p2p token already consumed")),
        Err(P2pTokenError::BadSignature) => buckley_error_to_response(BuckleyError::invalid_argument("p2p token signature invalid")),
    }
}
