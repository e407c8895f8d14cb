//! Observability Fan-out (§4.3): a WebSocket per subscriber, backed by the
//! same `EventBus<StoredEvent>` the Event Store publishes through. Each
//! subscriber gets its own bounded outgoing queue; a slow reader has its
//! oldest-pending frames dropped rather than stalling the publisher or other
//! subscribers (§8 property 4).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Extension;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use buckley_events::StoredEvent;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::app::state::AppState;

pub fn router() -> Router {
    Router::new().route("/", get(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, Extension(state): Extension<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum InboundFrame {
    Subscribe {
        #[serde(default)]
        event_types: Vec<String>,
    },
    Unsubscribe,
}

#[derive(Debug, Serialize)]
struct OutboundEvent<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    stream_id: &'a str,
    version: i64,
    timestamp: chrono::DateTime<chrono::Utc>,
    data: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OutboundError<'a> {
    error: &'a str,
}

/// Per-subscriber filter state (§4.3: "set of subscribed event types
/// (empty set = all), `subscribed` flag"). The two are distinct: a
/// connection that has never sent `{action:"subscribe"}` is not
/// subscribed at all and receives nothing, which is not the same state
/// as "subscribed with an empty type set" (deliver everything).
struct Filter {
    subscribed: AtomicBool,
    types: RwLock<Option<HashSet<String>>>,
}

impl Filter {
    fn new() -> Self {
        Self { subscribed: AtomicBool::new(false), types: RwLock::new(None) }
    }

    fn set(&self, event_types: Vec<String>) {
        let types = if event_types.is_empty() { None } else { Some(event_types.into_iter().collect()) };
        *self.types.write().unwrap() = types;
        self.subscribed.store(true, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.subscribed.store(false, Ordering::Relaxed);
        *self.types.write().unwrap() = None;
    }

    fn matches(&self, event: &StoredEvent) -> bool {
        if !self.subscribed.load(Ordering::Relaxed) {
            return false;
        }
        match &*self.types.read().unwrap() {
            None => true,
            Some(types) => types.contains(&event.event_type),
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let queue_size = state.config.websocket.queue_size;
    let ping_interval = state.config.websocket.ping_interval;
    let read_deadline = state.config.websocket.read_deadline;

    let (queue_tx, mut queue_rx) = mpsc::channel::<Message>(queue_size);
    let filter = Arc::new(Filter::new());
    let dropped = Arc::new(AtomicU64::new(0));

    let broadcast_filter = filter.clone();
    let broadcast_dropped = dropped.clone();
    let broadcast_tx = queue_tx.clone();
    let mut broadcast_rx = state.event_bus.raw_subscribe();
    let fanout = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(event) => {
                    if !broadcast_filter.matches(&event) {
                        continue;
                    }
                    let payload = OutboundEvent {
                        event_type: &event.event_type,
                        stream_id: &event.stream_id,
                        version: event.version,
                        timestamp: event.timestamp,
                        data: &event.data,
                    };
                    let Ok(text) = serde_json::to_string(&payload) else { continue };
                    if broadcast_tx.try_send(Message::Text(text)).is_err() {
                        let count = broadcast_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        tracing::warn!(dropped_total = count, "observability subscriber backpressure; dropping frame");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "observability subscriber lagged on the event bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut ping_timer = tokio::time::interval(ping_interval);
        ping_timer.tick().await;
        loop {
            tokio::select! {
                maybe_msg = queue_rx.recv() => {
                    match maybe_msg {
                        Some(msg) => {
                            if tokio::time::timeout(Duration::from_secs(10), sink.send(msg)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_timer.tick() => {
                    if tokio::time::timeout(Duration::from_secs(10), sink.send(Message::Ping(Vec::new()))).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let reader_filter = filter.clone();
    let reader_tx = queue_tx.clone();
    loop {
        let next = tokio::time::timeout(read_deadline, stream.next()).await;
        let Ok(Some(Ok(message))) = next else { break };
        match message {
            Message::Text(text) => match serde_json::from_str::<InboundFrame>(&text) {
                Ok(InboundFrame::Subscribe { event_types }) => reader_filter.set(event_types),
                Ok(InboundFrame::Unsubscribe) => reader_filter.clear(),
                Err(e) => {
                    let err = OutboundError { error: &format!("malformed subscription frame: {e}") };
                    if let Ok(text) = serde_json::to_string(&err) {
                        let _ = reader_tx.try_send(Message::Text(text));
                    }
                }
            },
            Message::Pong(_) => {}
            Message::Close(_) => break,
            _ => {}
        }
    }

    fanout.abort();
    writer.abort();
}
