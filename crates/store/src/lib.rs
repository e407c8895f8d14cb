//! Event Store: the append-only, per-stream, version-ordered log (§4.1).

pub mod event_store;

pub use event_store::{
    DistributedEventStore, EventStore, InMemoryEventStore, PublishingEventStore, Snapshot,
    SqliteEventStore, StoreError,
};
