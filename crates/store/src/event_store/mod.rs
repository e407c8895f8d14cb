//! Append-only event store boundary (§4.1).
//!
//! Two backends implement [`EventStore`] with bit-identical semantics:
//! [`sqlite`] (embedded relational) and [`distributed`] (NATS JetStream
//! log + KV). [`in_memory`] is a third, non-persistent backend used only by
//! tests elsewhere in the workspace. [`publishing`] wraps any backend to
//! fan committed events out through an `EventBus`.

pub mod distributed;
pub mod in_memory;
pub mod publishing;
pub mod sqlite;
pub mod r#trait;

pub use distributed::DistributedEventStore;
pub use in_memory::InMemoryEventStore;
pub use publishing::PublishingEventStore;
pub use r#trait::{EventStore, Snapshot, StoreError};
pub use sqlite::SqliteEventStore;
