//! Async fan-out used by the Event Store to implement `Subscribe` (§4.1) and
//! by the Service Discovery Registry to implement `Watch` (§4.5).
//!
//! At-least-once delivery is acceptable; handlers must be idempotent. A
//! handler that returns an error is logged and otherwise ignored — it never
//! blocks or kills the stream (§4.1 Semantics).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// A boxed, type-erased async handler invoked once per delivered message.
pub type BoxHandler<M> =
    Box<dyn Fn(M) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send + Sync>;

/// Broadcast-backed pub/sub. Cloning is cheap; all clones share the same
/// ring buffer and subscriber set.
#[derive(Clone)]
pub struct EventBus<M> {
    tx: broadcast::Sender<M>,
}

impl<M: Clone + Send + Sync + 'static> EventBus<M> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Number of currently live subscriptions (including raw receivers).
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a message to every current subscriber. Lagging subscribers
    /// drop the oldest buffered messages rather than block the publisher;
    /// that loss surfaces to them as `RecvError::Lagged` on their next recv.
    pub fn publish(&self, message: M) {
        // No receivers is not an error: publishing with zero subscribers is
        // the common case right after the process starts.
        let _ = self.tx.send(message);
    }

    /// A raw receiver for callers that want to drive their own recv loop
    /// (e.g. to bridge into a WebSocket writer or an SSE stream).
    pub fn raw_subscribe(&self) -> broadcast::Receiver<M> {
        self.tx.subscribe()
    }

    /// Spawn a task that invokes `handler` for every message accepted by
    /// `filter`, until the returned `Subscription` is dropped or explicitly
    /// unsubscribed.
    pub fn subscribe<F>(&self, filter: F, handler: BoxHandler<M>) -> Subscription
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        let mut rx = self.tx.subscribe();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    received = rx.recv() => {
                        match received {
                            Ok(message) => {
                                if !filter(&message) {
                                    continue;
                                }
                                if let Err(err) = handler(message).await {
                                    tracing::warn!(error = %err, "subscription handler returned an error");
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "subscriber lagged; oldest events were dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        Subscription {
            cancel,
            join: Arc::new(join),
        }
    }
}

/// A live subscription. Dropping it does not cancel the background task by
/// itself (the task may be shared); call [`Subscription::unsubscribe`] to
/// stop delivery.
#[derive(Clone)]
pub struct Subscription {
    cancel: CancellationToken,
    join: Arc<tokio::task::JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivering further messages. Idempotent.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.join.is_finished()
    }
}
