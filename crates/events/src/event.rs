//! The wire/storage shape of a coordination event (§3 Event).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Stream filter meaning "every stream" — only ever valid as a `Subscribe`
/// argument, never as the `stream_id` of a stored event.
pub const ALL_STREAMS: &str = "*";

/// An event not yet assigned a version; the store fills in `version` (and
/// `timestamp`, if left at the Unix epoch) at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub data: JsonValue,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default = "default_timestamp")]
    pub timestamp: DateTime<Utc>,
}

fn default_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, data: JsonValue) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            metadata: HashMap::new(),
            timestamp: default_timestamp(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A committed, version-ordered event read back from a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub stream_id: String,
    pub event_type: String,
    /// 1-based, monotonically increasing within `stream_id`.
    pub version: i64,
    pub data: JsonValue,
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}
