//! Adapter that publishes committed events to an [`EventBus`] after a
//! successful append.
//!
//! Directly grounded on the teacher's `PublishingEventStore`: publish only
//! happens after append succeeds, so a subscriber only ever observes events
//! that are already durable.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use buckley_core::CancellationToken;
use buckley_events::{EventBus, NewEvent, StoredEvent};

use super::r#trait::{EventStore, Snapshot, StoreError};

pub struct PublishingEventStore<S> {
    store: S,
    bus: EventBus<StoredEvent>,
}

impl<S> PublishingEventStore<S> {
    pub fn new(store: S, bus: EventBus<StoredEvent>) -> Self {
        Self { store, bus }
    }

    pub fn bus(&self) -> &EventBus<StoredEvent> {
        &self.bus
    }
}

#[async_trait]
impl<S> EventStore for PublishingEventStore<S>
where
    S: EventStore,
{
    async fn append(
        &self,
        stream_id: &str,
        events: Vec<NewEvent>,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let committed = self.store.append(stream_id, events, cancel).await?;
        for event in &committed {
            self.bus.publish(event.clone());
        }
        Ok(committed)
    }

    async fn read(
        &self,
        stream_id: &str,
        from_version: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        self.store.read(stream_id, from_version, cancel).await
    }

    async fn snapshot(
        &self,
        stream_id: &str,
        version: i64,
        state: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.store.snapshot(stream_id, version, state, cancel).await
    }

    async fn load_snapshot(
        &self,
        stream_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Snapshot>, StoreError> {
        self.store.load_snapshot(stream_id, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::in_memory::InMemoryEventStore;
    use serde_json::json;

    #[tokio::test]
    async fn append_publishes_after_commit() {
        let bus = EventBus::new(16);
        let mut rx = bus.raw_subscribe();
        let store = PublishingEventStore::new(InMemoryEventStore::new(), bus);
        let cancel = CancellationToken::new();

        store
            .append("s", vec![NewEvent::new("task.started", json!({}))], &cancel)
            .await
            .unwrap();

        let published = rx.recv().await.unwrap();
        assert_eq!(published.event_type, "task.started");
    }
}
