//! Streaming task execution (§4.2 "clients open a server-stream; the
//! server emits textual TaskEvents ... cancellation of the stream
//! propagates to the orchestrator").

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Extension;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use buckley_core::{BuckleyError, CancellationToken};
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::app::dto::{StartTaskRequest, TaskEvent};
use crate::app::errors::buckley_error_to_response;
use crate::app::state::AppState;

pub fn router() -> Router {
    Router::new().route("/", post(start_task))
}

async fn start_task(Extension(_state): Extension<Arc<AppState>>, Json(req): Json<StartTaskRequest>) -> Response {
    if req.goal.trim().is_empty() {
        return buckley_error_to_response(BuckleyError::invalid_argument("goal must not be empty"));
    }

    let task_id = buckley_core::RandomToken::generate().to_string();
    let (tx, rx) = unbounded_channel::<Result<SseEvent, Infallible>>();
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        let emit = |event: TaskEvent| -> Result<SseEvent, Infallible> {
            Ok(SseEvent::default().json_data(event).unwrap_or_else(|_| SseEvent::default()))
        };

        if tx.send(emit(TaskEvent::Planning { task_id: task_id.clone() })).is_err() {
            return;
        }

        for iteration in 1..=3u32 {
            if task_cancel.is_cancelled() {
                return;
            }
            tokio::select! {
                _ = task_cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            let summary = format!("iteration {iteration} of goal progress");
            if tx
                .send(emit(TaskEvent::Executing { task_id: task_id.clone(), iteration, summary }))
                .is_err()
            {
                return;
            }
        }

        let _ = tx.send(emit(TaskEvent::Completed { task_id: task_id.clone() }));
    });

    let stream = UnboundedReceiverStream::new(rx);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))).into_response()
}
