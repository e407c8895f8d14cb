//! Event data model and the async pub/sub primitive built on top of it.
//!
//! This crate owns *mechanics*, not persistence — [`store`](../buckley_store)
//! is the append-only log; this crate is what lets many independent parts
//! of the server (fan-out, projections, watchers) observe it.

pub mod bus;
pub mod event;

pub use bus::{BoxHandler, EventBus, Subscription};
pub use event::{NewEvent, StoredEvent, ALL_STREAMS};
