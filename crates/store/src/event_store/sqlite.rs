//! Embedded relational backend (§4.1, "embedded relational store").
//!
//! Grounded on the teacher's `sqlx`-based Postgres adapter, retargeted at
//! SQLite: a single-file WAL-mode database is the idiomatic embedded choice
//! for a process that has to run without an external database.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex as AsyncMutex;

use buckley_core::CancellationToken;
use buckley_events::{NewEvent, StoredEvent};

use super::r#trait::{EventStore, Snapshot, StoreError};

pub struct SqliteEventStore {
    pool: SqlitePool,
    /// Per-`stream_id` write locks. SQLite's busy-timeout alone only makes
    /// a racing transaction retry/wait at the OS level; it does not stop
    /// two connections from both reading the same `MAX(version)` before
    /// either commits. §4.1 requires in-process serialization per stream
    /// on top of the busy-timeout, so every `append` holds this lock for
    /// the duration of its read-then-insert-then-commit sequence.
    stream_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SqliteEventStore {
    fn stream_lock(&self, stream_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.stream_locks.lock().expect("stream_locks poisoned");
        locks.entry(stream_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

impl SqliteEventStore {
    /// Open (creating if absent) the database at `path`, set WAL journaling
    /// and a five-second busy timeout, and lock down file permissions to
    /// owner-only (§6: file 0600, parent directory 0700).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("creating data directory: {e}")))?;
            set_owner_only_dir(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("opening database: {e}")))?;

        set_owner_only_file(path)?;

        let store = Self { pool, stream_locks: StdMutex::new(HashMap::new()) };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                stream_id  TEXT NOT NULL,
                version    INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                data       TEXT NOT NULL,
                metadata   TEXT NOT NULL,
                timestamp  TEXT NOT NULL,
                PRIMARY KEY (stream_id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("creating events table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                stream_id TEXT PRIMARY KEY,
                version   INTEGER NOT NULL,
                state     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("creating snapshots table: {e}")))?;

        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_only_dir(dir: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| StoreError::Storage(format!("setting directory permissions: {e}")))
}

#[cfg(not(unix))]
fn set_owner_only_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_file(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    if path.exists() {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| StoreError::Storage(format!("setting file permissions: {e}")))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_file(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

fn check_canceled(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Canceled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
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

        let lock = self.stream_lock(stream_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("starting transaction: {e}")))?;

        let row = sqlx::query("SELECT MAX(version) AS v FROM events WHERE stream_id = ?")
            .bind(stream_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("reading current version: {e}")))?;
        let mut next_version: i64 = row.try_get::<Option<i64>, _>("v").unwrap_or(None).unwrap_or(0) + 1;

        let mut committed = Vec::with_capacity(events.len());
        for event in events {
            check_canceled(cancel)?;

            let metadata = serde_json::to_string(&event.metadata)
                .map_err(|e| StoreError::Encoding(format!("encoding metadata: {e}")))?;
            let data = serde_json::to_string(&event.data)
                .map_err(|e| StoreError::Encoding(format!("encoding event data: {e}")))?;

            sqlx::query(
                "INSERT INTO events (stream_id, version, event_type, data, metadata, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(stream_id)
            .bind(next_version)
            .bind(&event.event_type)
            .bind(&data)
            .bind(&metadata)
            .bind(event.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::VersionGap(format!("appending version {next_version}: {e}")))?;

            committed.push(StoredEvent {
                stream_id: stream_id.to_string(),
                event_type: event.event_type,
                version: next_version,
                data: event.data,
                metadata: event.metadata,
                timestamp: event.timestamp,
            });
            next_version += 1;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("committing append: {e}")))?;

        Ok(committed)
    }

    async fn read(
        &self,
        stream_id: &str,
        from_version: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        check_canceled(cancel)?;
        let rows = sqlx::query(
            "SELECT stream_id, version, event_type, data, metadata, timestamp
             FROM events WHERE stream_id = ? AND version >= ? ORDER BY version ASC",
        )
        .bind(stream_id)
        .bind(from_version)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("reading stream: {e}")))?;

        rows.into_iter()
            .map(|row| row_to_stored_event(&row))
            .collect()
    }

    async fn snapshot(
        &self,
        stream_id: &str,
        version: i64,
        state: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check_canceled(cancel)?;
        let state = serde_json::to_string(&state)
            .map_err(|e| StoreError::Encoding(format!("encoding snapshot state: {e}")))?;

        sqlx::query(
            "INSERT INTO snapshots (stream_id, version, state) VALUES (?, ?, ?)
             ON CONFLICT(stream_id) DO UPDATE SET version = excluded.version, state = excluded.state",
        )
        .bind(stream_id)
        .bind(version)
        .bind(&state)
        .execute(&self.pool)
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
        let row = sqlx::query("SELECT version, state FROM snapshots WHERE stream_id = ?")
            .bind(stream_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("reading snapshot: {e}")))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| StoreError::Storage(format!("reading snapshot version: {e}")))?;
                let raw: String = row
                    .try_get("state")
                    .map_err(|e| StoreError::Storage(format!("reading snapshot state: {e}")))?;
                let state = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Encoding(format!("decoding snapshot state: {e}")))?;
                Ok(Some(Snapshot { version, state }))
            }
        }
    }
}

fn row_to_stored_event(row: &sqlx::sqlite::SqliteRow) -> Result<StoredEvent, StoreError> {
    let stream_id: String = row
        .try_get("stream_id")
        .map_err(|e| StoreError::Storage(format!("reading stream_id: {e}")))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| StoreError::Storage(format!("reading version: {e}")))?;
    let event_type: String = row
        .try_get("event_type")
        .map_err(|e| StoreError::Storage(format!("reading event_type: {e}")))?;
    let raw_data: String = row
        .try_get("data")
        .map_err(|e| StoreError::Storage(format!("reading data: {e}")))?;
    let raw_metadata: String = row
        .try_get("metadata")
        .map_err(|e| StoreError::Storage(format!("reading metadata: {e}")))?;
    let raw_timestamp: String = row
        .try_get("timestamp")
        .map_err(|e| StoreError::Storage(format!("reading timestamp: {e}")))?;

    let data = serde_json::from_str(&raw_data)
        .map_err(|e| StoreError::Encoding(format!("decoding event data: {e}")))?;
    let metadata = serde_json::from_str(&raw_metadata)
        .map_err(|e| StoreError::Encoding(format!("decoding metadata: {e}")))?;
    let timestamp = chrono::DateTime::parse_from_rfc3339(&raw_timestamp)
        .map_err(|e| StoreError::Encoding(format!("decoding timestamp: {e}")))?
        .with_timezone(&chrono::Utc);

    Ok(StoredEvent {
        stream_id,
        event_type,
        version,
        data,
        metadata,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn open_store() -> (SqliteEventStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SqliteEventStore::open(dir.path().join("data").join("events.db"))
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn append_and_read_round_trip() {
        let (store, _dir) = open_store().await;
        let cancel = CancellationToken::new();

        store
            .append(
                "session-1",
                vec![NewEvent::new("task.started", json!({"n": 1}))],
                &cancel,
            )
            .await
            .unwrap();

        let events = store.read("session-1", 0, &cancel).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].version, 1);
    }

    #[tokio::test]
    async fn append_assigns_monotonic_versions_across_calls() {
        let (store, _dir) = open_store().await;
        let cancel = CancellationToken::new();

        store
            .append("s", vec![NewEvent::new("a", json!(1))], &cancel)
            .await
            .unwrap();
        let second = store
            .append("s", vec![NewEvent::new("b", json!(2))], &cancel)
            .await
            .unwrap();

        assert_eq!(second[0].version, 2);
    }

    #[tokio::test]
    async fn concurrent_appends_to_one_stream_never_collide() {
        let (store, _dir) = open_store().await;
        let store = Arc::new(store);
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for n in 0..20 {
            let store = store.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                store.append("shared", vec![NewEvent::new("t", json!({"n": n}))], &cancel).await
            }));
        }

        let mut versions = Vec::new();
        for handle in handles {
            let committed = handle.await.unwrap().expect("append must not race-fail");
            versions.push(committed[0].version);
        }

        versions.sort_unstable();
        assert_eq!(versions, (1..=20).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn snapshot_overwrites_previous() {
        let (store, _dir) = open_store().await;
        let cancel = CancellationToken::new();

        store.snapshot("s", 1, json!({"v": 1}), &cancel).await.unwrap();
        store.snapshot("s", 2, json!({"v": 2}), &cancel).await.unwrap();

        let snap = store.load_snapshot("s", &cancel).await.unwrap().unwrap();
        assert_eq!(snap.version, 2);
    }
}
