//! Tool execution state machine (§4.2):
//!
//! ```text
//! idle -> started -> (policy-denied | needs-approval | dispatch)
//! needs-approval -> (approved | rejected | timeout)
//! dispatch -> (completed | failed)
//! ```

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, Path};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use buckley_auth::check_and_audit;
use buckley_core::RandomToken;
use chrono::Utc;
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::app::dto::{ApprovalDecisionRequest, StartToolExecutionRequest, ToolExecutionEvent};
use crate::app::errors::buckley_error_to_response;
use crate::app::state::AppState;
use crate::config::TrustLevel;
use crate::context::PeerContext;
use crate::domain::ApprovalResult;

pub fn router() -> Router {
    Router::new()
        .route("/", post(start_tool_execution))
        .route("/:execution_id/approve", post(approve))
        .route("/:execution_id/reject", post(reject))
}

async fn start_tool_execution(
    Extension(state): Extension<Arc<AppState>>,
    Extension(peer): Extension<PeerContext>,
    Json(req): Json<StartToolExecutionRequest>,
) -> Response {
    let (tx, rx) = unbounded_channel::<Result<SseEvent, Infallible>>();
    let emit = |event: ToolExecutionEvent| -> Result<SseEvent, Infallible> {
        Ok(SseEvent::default().json_data(event).unwrap_or_else(|_| SseEvent::default()))
    };

    let execution_token = RandomToken::generate();
    let execution_id = execution_token.to_string();
    let _ = tx.send(emit(ToolExecutionEvent::Started { execution_id: execution_id.clone() }));

    let allowed = check_and_audit(&state.policy, &state.audit, &req.agent_id, peer.capabilities(), &req.tool, Utc::now()).await;
    if !allowed {
        let _ = tx.send(emit(ToolExecutionEvent::PolicyDenied {
            execution_id,
            reason: "tool not permitted for peer's capabilities".to_string(),
        }));
        return sse_response(rx);
    }

    if state.config.policy.trust_level == TrustLevel::Autonomous {
        dispatch(&state, &tx, &emit, execution_id, req.tool, req.parameters).await;
        return sse_response(rx);
    }

    let approval_rx = state
        .pending_approvals
        .create(execution_token, req.agent_id, req.tool.clone(), req.parameters.clone(), Utc::now())
        .await;
    let _ = tx.send(emit(ToolExecutionEvent::NeedsApproval { execution_id: execution_id.clone() }));

    let state = state.clone();
    let tool = req.tool;
    let parameters = req.parameters;
    tokio::spawn(async move {
        let emit = |event: ToolExecutionEvent| -> Result<SseEvent, Infallible> {
            Ok(SseEvent::default().json_data(event).unwrap_or_else(|_| SseEvent::default()))
        };
        let outcome = tokio::time::timeout(state.config.tool_approval_timeout, approval_rx).await;
        state.pending_approvals.remove(&execution_id).await;

        match outcome {
            Ok(Ok(result)) if result.approved => {
                let _ = tx.send(emit(ToolExecutionEvent::Approved { execution_id: execution_id.clone() }));
                dispatch(&state, &tx, &emit, execution_id, tool, parameters).await;
            }
            Ok(Ok(result)) => {
                let _ = tx.send(emit(ToolExecutionEvent::Rejected {
                    execution_id,
                    reason: result.reason.unwrap_or_else(|| "rejected by approver".to_string()),
                }));
            }
            Ok(Err(_recv_error)) => {
                // Approval channel dropped without a decision: treat as rejected.
                let _ = tx.send(emit(ToolExecutionEvent::Rejected {
                    execution_id,
                    reason: "approval channel closed".to_string(),
                }));
            }
            Err(_elapsed) => {
                let _ = tx.send(emit(ToolExecutionEvent::Timeout { execution_id }));
            }
        }
    });

    sse_response(rx)
}

async fn dispatch(
    state: &Arc<AppState>,
    tx: &tokio::sync::mpsc::UnboundedSender<Result<SseEvent, Infallible>>,
    emit: &dyn Fn(ToolExecutionEvent) -> Result<SseEvent, Infallible>,
    execution_id: String,
    tool: String,
    parameters: serde_json::Value,
) {
    let event = match state.tool_registry.invoke(&tool, &parameters).await {
        Ok(result) => ToolExecutionEvent::Completed { execution_id, result },
        Err(e) => ToolExecutionEvent::Failed { execution_id, reason: e.to_string() },
    };
    let _ = tx.send(emit(event));
}

fn sse_response(rx: tokio::sync::mpsc::UnboundedReceiver<Result<SseEvent, Infallible>>) -> Response {
    let stream = UnboundedReceiverStream::new(rx);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))).into_response()
}

async fn approve(Extension(state): Extension<Arc<AppState>>, Path(execution_id): Path<String>, Json(req): Json<ApprovalDecisionRequest>) -> Response {
    resolve(state, execution_id, ApprovalResult { approved: true, remember: req.remember, reason: req.reason }).await
}

async fn reject(Extension(state): Extension<Arc<AppState>>, Path(execution_id): Path<String>, Json(req): Json<ApprovalDecisionRequest>) -> Response {
    resolve(state, execution_id, ApprovalResult { approved: false, remember: req.remember, reason: req.reason }).await
}

async fn resolve(state: Arc<AppState>, execution_id: String, result: ApprovalResult) -> Response {
    match state.pending_approvals.resolve(&execution_id, result).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => buckley_error_to_response(e),
    }
}
