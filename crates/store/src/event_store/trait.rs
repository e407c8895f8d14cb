//! The append-only, per-stream event store contract (§4.1).
//!
//! Both backends ([`sqlite`](super::sqlite), [`distributed`](super::distributed))
//! implement this trait and must pass the same property tests (§8); callers
//! never match on which backend they were handed.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use buckley_core::CancellationToken;
use buckley_events::{NewEvent, StoredEvent};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("version gap: {0}")]
    VersionGap(String),

    #[error("encoding failure: {0}")]
    Encoding(String),

    #[error("operation canceled")]
    Canceled,
}

impl From<StoreError> for buckley_core::BuckleyError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Canceled => buckley_core::BuckleyError::Canceled,
            other => buckley_core::BuckleyError::internal(other.to_string()),
        }
    }
}

/// Snapshot of folded stream state, as of a specific version (§3 Snapshot).
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: i64,
    pub state: JsonValue,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append `events` to `stream_id`, atomically. Any caller-supplied
    /// version on the events is ignored; the store assigns
    /// `last_version + i + 1`. Either every event commits with a
    /// contiguous version, or none do.
    async fn append(
        &self,
        stream_id: &str,
        events: Vec<NewEvent>,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// Events in `stream_id` with `version >= from_version`, ascending.
    /// `from_version == 0` returns the whole stream.
    async fn read(
        &self,
        stream_id: &str,
        from_version: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    async fn snapshot(
        &self,
        stream_id: &str,
        version: i64,
        state: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    /// The latest snapshot for `stream_id`, if any.
    async fn load_snapshot(
        &self,
        stream_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Snapshot>, StoreError>;
}
