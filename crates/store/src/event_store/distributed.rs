//! Distributed log backend (§4.1, "distributed log/KV substrate").
//!
//! Grounded on the JetStream patterns used elsewhere in the retrieval
//! pack: one subject per stream, `Nats-Expected-Last-Subject-Sequence`
//! headers for optimistic concurrency on append, and a JetStream KV
//! bucket for snapshots.

use async_nats::jetstream::{self, context::PublishErrorKind, kv};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

use buckley_core::CancellationToken;
use buckley_events::{NewEvent, StoredEvent};

use super::r#trait::{EventStore, Snapshot, StoreError};

const DEFAULT_STREAM_PREFIX: &str = "buckley-events";
const DEFAULT_SNAPSHOT_BUCKET: &str = "acp_snapshots";

#[derive(Debug, Clone)]
struct StoredRecord {
    event_type: String,
    data: JsonValue,
    metadata: std::collections::HashMap<String, String>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct DistributedEventStore {
    jetstream: jetstream::Context,
    stream: jetstream::stream::Stream,
    snapshots: kv::Store,
    subject_prefix: String,
}

impl DistributedEventStore {
    pub async fn connect(nats_url: &str, stream_prefix: &str, snapshot_bucket: &str) -> Result<Self, StoreError> {
        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| StoreError::Storage(format!("connecting to nats: {e}")))?;
        Self::from_client(client, stream_prefix, snapshot_bucket).await
    }

    pub async fn from_client(
        client: async_nats::Client,
        stream_prefix: &str,
        snapshot_bucket: &str,
    ) -> Result<Self, StoreError> {
        let jetstream = jetstream::new(client);

        let stream_prefix = if stream_prefix.is_empty() { DEFAULT_STREAM_PREFIX } else { stream_prefix };
        let snapshot_bucket = if snapshot_bucket.is_empty() { DEFAULT_SNAPSHOT_BUCKET } else { snapshot_bucket };

        // The JetStream stream name is a single operator-chosen resource
        // name (§6: "<prefix>-<sanitized-stream-id>" collapses to just the
        // prefix here, since one physical stream backs every logical
        // Buckley stream via subject routing), so it is sanitized the same
        // way a stream id would be.
        let sanitized_name: String = stream_prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();

        let stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: sanitized_name,
                subjects: vec![format!("{stream_prefix}.>")],
                retention: jetstream::stream::RetentionPolicy::Limits,
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| StoreError::Storage(format!("creating event stream: {e}")))?;

        let snapshots = jetstream
            .create_key_value(kv::Config {
                bucket: snapshot_bucket.to_string(),
                history: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| StoreError::Storage(format!("creating snapshot bucket: {e}")))?;

        Ok(Self {
            jetstream,
            stream,
            snapshots,
            subject_prefix: stream_prefix.to_string(),
        })
    }

    /// Map a `stream_id` to a JetStream subject: `<prefix>.<stream_id>`,
    /// left unsanitized. Buckley stream ids are always agent/session ids
    /// generated internally (ULIDs or validated identifiers), which never
    /// contain `.`/`*`/`>`; this is a deliberate deviation from the
    /// physical-stream-name sanitization above, not an oversight.
    fn subject_for(&self, stream_id: &str) -> String {
        format!("{}.{}", self.subject_prefix, stream_id)
    }
}

fn check_canceled(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Canceled)
    } else {
        Ok(())
    }
}

fn encode(event: &NewEvent) -> Result<Vec<u8>, StoreError> {
    let record = serde_json::json!({
        "event_type": event.event_type,
        "data": event.data,
        "metadata": event.metadata,
        "timestamp": event.timestamp,
    });
    serde_json::to_vec(&record).map_err(|e| StoreError::Encoding(format!("encoding event: {e}")))
}

fn decode(payload: &[u8]) -> Result<StoredRecord, StoreError> {
    let value: JsonValue = serde_json::from_slice(payload)
        .map_err(|e| StoreError::Encoding(format!("decoding event: {e}")))?;
    Ok(StoredRecord {
        event_type: value["event_type"].as_str().unwrap_or_default().to_string(),
        data: value["data"].clone(),
        metadata: serde_json::from_value(value["metadata"].clone()).unwrap_or_default(),
        timestamp: serde_json::from_value(value["timestamp"].clone())
            .map_err(|e| StoreError::Encoding(format!("decoding timestamp: {e}")))?,
    })
}

#[async_trait]
impl EventStore for DistributedEventStore {
    async fn append(
        &self,
        stream_id: &str,
        events: Vec<NewEvent>,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        check_canceled(cancel)?;
        if events.is_empty() {
            return Ok(vec![]);
        }

        let subject = self.subject_for(stream_id);

        let info = self
            .stream
            .info()
            .await
            .map_err(|e| StoreError::Storage(format!("reading stream info: {e}")))?;
        let _ = info;

        let mut last_sequence = self
            .stream
            .clone()
            .get_last_raw_message_by_subject(&subject)
            .await
            .ok()
            .map(|m| m.sequence)
            .unwrap_or(0);

        if last_sequence > i64::MAX as u64 {
            return Err(StoreError::Storage(
                "stream sequence number exceeds representable range".into(),
            ));
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut version = (last_sequence as i64) + 1;

        for event in events {
            check_canceled(cancel)?;
            let payload = encode(&event)?;

            let mut publish = self.jetstream.publish(subject.clone(), payload.into());
            publish = publish.expected_last_subject_sequence(last_sequence);

            let ack = publish
                .await
                .map_err(|e| StoreError::Storage(format!("publishing event: {e}")))?
                .await
                .map_err(|e| match e.kind() {
                    PublishErrorKind::WrongLastSequence => {
                        StoreError::VersionGap(format!("stream {stream_id} advanced concurrently"))
                    }
                    _ => StoreError::Storage(format!("awaiting publish ack: {e}")),
                })?;

            last_sequence = ack.sequence;

            committed.push(StoredEvent {
                stream_id: stream_id.to_string(),
                event_type: event.event_type,
                version,
                data: event.data,
                metadata: event.metadata,
                timestamp: event.timestamp,
            });
            version += 1;
        }

        Ok(committed)
    }

    async fn read(
        &self,
        stream_id: &str,
        from_version: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        check_canceled(cancel)?;
        let subject = self.subject_for(stream_id);

        let mut consumer = self
            .stream
            .create_consumer(jetstream::consumer::pull::Config {
                filter_subject: subject.clone(),
                deliver_policy: jetstream::consumer::DeliverPolicy::All,
                ack_policy: jetstream::consumer::AckPolicy::None,
                ..Default::default()
            })
            .await
            .map_err(|e| StoreError::Storage(format!("creating read consumer: {e}")))?;

        let info = consumer
            .info()
            .await
            .map_err(|e| StoreError::Storage(format!("reading consumer info: {e}")))?;
        let pending = info.num_pending;

        let mut events = Vec::new();
        if pending == 0 {
            return Ok(events);
        }

        let mut messages = consumer
            .fetch()
            .max_messages(pending as usize)
            .messages()
            .await
            .map_err(|e| StoreError::Storage(format!("fetching messages: {e}")))?;

        let mut version: i64 = 0;
        while let Some(message) = futures_util::StreamExt::next(&mut messages).await {
            check_canceled(cancel)?;
            let message = message.map_err(|e| StoreError::Storage(format!("reading message: {e}")))?;
            version += 1;
            if version < from_version {
                continue;
            }
            let record = decode(&message.payload)?;
            events.push(StoredEvent {
                stream_id: stream_id.to_string(),
                event_type: record.event_type,
                version,
                data: record.data,
                metadata: record.metadata,
                timestamp: record.timestamp,
            });
        }

        Ok(events)
    }

    async fn snapshot(
        &self,
        stream_id: &str,
        version: i64,
        state: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check_canceled(cancel)?;
        let record = serde_json::json!({ "version": version, "state": state });
        let payload = serde_json::to_vec(&record)
            .map_err(|e| StoreError::Encoding(format!("encoding snapshot: {e}")))?;

        self.snapshots
            .put(stream_id, payload.into())
            .await
            .map_err(|e| StoreError::Storage(format!("writing snapshot: {e}")))?;

        Ok(())
    }

    async fn load_snapshot(
        &self,
        stream_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Snapshot>, StoreError> {
        check_canceled(cancel)?;
        let entry = self
            .snapshots
            .get(stream_id)
            .await
            .map_err(|e| StoreError::Storage(format!("reading snapshot: {e}")))?;

        match entry {
            None => Ok(None),
            Some(bytes) => {
                let value: JsonValue = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Encoding(format!("decoding snapshot: {e}")))?;
                let version = value["version"]
                    .as_i64()
                    .ok_or_else(|| StoreError::Encoding("snapshot missing version".into()))?;
                Ok(Some(Snapshot {
                    version,
                    state: value["state"].clone(),
                }))
            }
        }
    }
}
