//! Editor integrations: `ApplyEdits`, `ProposeEdits` (dry-run variant of the
//! same algorithm), `UpdateEditorState`, and `StreamInlineCompletions` (§4.2,
//! §6 path resolution, §8 property 7).

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Extension;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use buckley_core::BuckleyError;
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::app::dto::{ApplyEditsRequest, ApplyEditsResponse, InlineCompletionEvent, StreamInlineCompletionsRequest, UpdateEditorStateRequest};
use crate::app::errors::buckley_error_to_response;
use crate::app::state::AppState;
use crate::domain::edit::{apply_edits, Edit};
use crate::path_resolve;

pub fn router() -> Router {
    Router::new()
        .route("/apply-edits", post(apply_edits_route))
        .route("/propose-edits", post(propose_edits_route))
        .route("/state", post(update_editor_state))
        .route("/completions", post(stream_inline_completions))
}

async fn apply_edits_route(Extension(state): Extension<Arc<AppState>>, Json(req): Json<ApplyEditsRequest>) -> Response {
    apply(&state, req, false).await
}

async fn propose_edits_route(Extension(state): Extension<Arc<AppState>>, Json(mut req): Json<ApplyEditsRequest>) -> Response {
    req.dry_run = true;
    apply(&state, req, true).await
}

async fn apply(state: &AppState, req: ApplyEditsRequest, force_dry_run: bool) -> Response {
    let dry_run = req.dry_run || force_dry_run;

    let mut by_uri: HashMap<String, Vec<Edit>> = HashMap::new();
    for edit in req.edits {
        by_uri.entry(edit.uri).or_default().push(Edit { range: edit.range, new_text: edit.new_text });
    }

    let mut applied_files = Vec::with_capacity(by_uri.len());
    let mut rewritten: Vec<(std::path::PathBuf, String)> = Vec::with_capacity(by_uri.len());

    for (uri, edits) in by_uri {
        let path = match path_resolve::resolve(&uri, &state.config.project_root) {
            Ok(path) => path,
            Err(e) => return buckley_error_to_response(e),
        };
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => return buckley_error_to_response(BuckleyError::not_found(format!("{uri}: {e}"))),
        };
        let new_content = match apply_edits(&content, &edits) {
            Ok(new_content) => new_content,
            Err(e) => return buckley_error_to_response(BuckleyError::invalid_argument(format!("{uri}: {e}"))),
        };
        applied_files.push(uri);
        rewritten.push((path, new_content));
    }

    if dry_run {
        return Json(ApplyEditsResponse {
            applied: false,
            applied_files,
            message: "dry-run only (no files written)".to_string(),
        })
        .into_response();
    }

    for (path, new_content) in rewritten {
        if let Err(e) = tokio::fs::write(&path, new_content).await {
            return buckley_error_to_response(BuckleyError::internal(format!("failed writing {}: {e}", path.display())));
        }
    }

    Json(ApplyEditsResponse {
        applied: true,
        applied_files,
        message: "edits applied".to_string(),
    })
    .into_response()
}

async fn update_editor_state(Extension(state): Extension<Arc<AppState>>, Json(req): Json<UpdateEditorStateRequest>) -> Response {
    if let Err(e) = path_resolve::resolve(&req.uri, &state.config.project_root) {
        return buckley_error_to_response(e);
    }
    axum::http::StatusCode::NO_CONTENT.into_response()
}

async fn stream_inline_completions(Extension(state): Extension<Arc<AppState>>, Json(req): Json<StreamInlineCompletionsRequest>) -> Response {
    if let Err(e) = path_resolve::resolve(&req.uri, &state.config.project_root) {
        return buckley_error_to_response(e);
    }

    let (tx, rx) = unbounded_channel::<Result<SseEvent, Infallible>>();
    tokio::spawn(async move {
        let emit = |event: InlineCompletionEvent| -> Result<SseEvent, Infallible> {
            Ok(SseEvent::default().json_data(event).unwrap_or_else(|_| SseEvent::default()))
        };
        let suggestion = format!("// suggestion near line {}", req.position.line);
        if tx.send(emit(InlineCompletionEvent::Suggestion { text: suggestion })).is_err() {
            return;
        }
        let _ = tx.send(emit(InlineCompletionEvent::Done));
    });

    let stream = UnboundedReceiverStream::new(rx);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))).into_response()
}
