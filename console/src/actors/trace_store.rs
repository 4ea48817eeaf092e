//! TraceStoreActor - append-only log of outbound HTTP trace events
//!
//! Persistent storage for trace events using SQLite (libsql), queried by
//! recency. Supports both file-based and in-memory databases.
//!
//! The store is deliberately dumb: it appends what producers hand it and
//! returns recent rows. Upstream producers disagree on timestamp shapes and
//! payload encodings, so the `timestamp` column keeps the raw JSON encoding
//! and decoding stays best-effort per row; one bad row never poisons a
//! batch. All semantic interpretation lives in the reconstruction pipeline.

use async_trait::async_trait;
use libsql::Connection;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};

use trace_types::{EventKind, EventSource, EventStatus, RawTimestamp, TraceEvent};

/// Actor that manages the append-only trace-event log
#[derive(Debug, Default)]
pub struct TraceStoreActor;

/// Arguments for spawning TraceStoreActor
#[derive(Debug, Clone)]
pub enum TraceStoreArguments {
    /// File-based database path
    File(String),
    /// In-memory database (for testing)
    InMemory,
}

/// State for TraceStoreActor
pub struct TraceStoreState {
    conn: Connection,
}

// ============================================================================
// Messages
// ============================================================================

/// Messages handled by TraceStoreActor
#[derive(Debug)]
pub enum TraceStoreMsg {
    /// Append a new trace event and return the stored row
    Append {
        record: AppendTrace,
        reply: RpcReplyPort<Result<TraceEvent, TraceStoreError>>,
    },
    /// Fire-and-forget append, used by the recorder on hot paths
    AppendAsync { record: AppendTrace },
    /// Most recent events, returned in ascending store order.
    ///
    /// Filters are optional; callers must tolerate a store that ignores
    /// them and re-filter client-side.
    GetRecent {
        limit: i64,
        source: Option<EventSource>,
        request_id: Option<String>,
        reply: RpcReplyPort<Result<Vec<TraceEvent>, TraceStoreError>>,
    },
    /// Fetch a single event by its sequence number
    GetBySeq {
        seq: i64,
        reply: RpcReplyPort<Result<Option<TraceEvent>, TraceStoreError>>,
    },
}

impl TraceStoreActor {
    async fn new_with_path(database_path: &str) -> Result<Connection, libsql::Error> {
        if database_path != ":memory:" {
            if let Some(parent) = std::path::Path::new(database_path).parent() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let db = libsql::Builder::new_local(database_path).build().await?;
        let conn = db.connect()?;
        Self::run_migrations(&conn).await?;
        Ok(conn)
    }

    async fn run_migrations(conn: &Connection) -> Result<(), libsql::Error> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS trace_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                request_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                method TEXT,
                url TEXT,
                message TEXT,
                event_tag TEXT,
                timestamp TEXT NOT NULL,
                status TEXT,
                response_body TEXT,
                source TEXT NOT NULL DEFAULT 'web'
            )
            "#,
            (),
        )
        .await?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trace_events_request_id ON trace_events(request_id)",
            (),
        )
        .await?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trace_events_source ON trace_events(source)",
            (),
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Actor for TraceStoreActor {
    type Msg = TraceStoreMsg;
    type State = TraceStoreState;
    type Arguments = TraceStoreArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            "TraceStoreActor starting"
        );

        let conn = match args {
            TraceStoreArguments::File(path) => {
                tracing::info!(database_path = %path, "Opening file-based trace database");
                Self::new_with_path(&path).await.map_err(|e| {
                    ActorProcessingErr::from(format!("Failed to open trace database: {e}"))
                })?
            }
            TraceStoreArguments::InMemory => {
                tracing::info!("Opening in-memory trace database");
                Self::new_with_path(":memory:").await.map_err(|e| {
                    ActorProcessingErr::from(format!("Failed to open in-memory trace database: {e}"))
                })?
            }
        };

        Ok(TraceStoreState { conn })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            TraceStoreMsg::Append { record, reply } => {
                let result = self.handle_append(record, state).await;
                let _ = reply.send(result);
            }
            TraceStoreMsg::AppendAsync { record } => {
                if let Err(e) = self.handle_append(record, state).await {
                    tracing::warn!(error = %e, "Async trace append failed");
                }
            }
            TraceStoreMsg::GetRecent {
                limit,
                source,
                request_id,
                reply,
            } => {
                let result = self.handle_get_recent(limit, source, request_id, state).await;
                let _ = reply.send(result);
            }
            TraceStoreMsg::GetBySeq { seq, reply } => {
                let result = self.handle_get_by_seq(seq, state).await;
                let _ = reply.send(result);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            "TraceStoreActor stopped"
        );
        Ok(())
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// Trace event to append to the store
#[derive(Debug, Clone)]
pub struct AppendTrace {
    pub request_id: String,
    pub kind: EventKind,
    pub method: Option<String>,
    pub url: Option<String>,
    pub message: Option<String>,
    pub event_tag: Option<String>,
    pub timestamp: RawTimestamp,
    pub status: Option<EventStatus>,
    pub response_body: Option<serde_json::Value>,
    pub source: EventSource,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in TraceStoreActor
#[derive(Debug, thiserror::Error, Clone)]
pub enum TraceStoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Trace event not found: seq={0}")]
    NotFound(i64),

    #[error("Corrupt trace row: {0}")]
    CorruptRow(String),
}

impl From<libsql::Error> for TraceStoreError {
    fn from(e: libsql::Error) -> Self {
        TraceStoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for TraceStoreError {
    fn from(e: serde_json::Error) -> Self {
        TraceStoreError::Serialization(e.to_string())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

const SELECT_COLUMNS: &str =
    "seq, event_id, request_id, kind, method, url, message, event_tag, timestamp, status, response_body, source";

impl TraceStoreActor {
    async fn handle_append(
        &self,
        record: AppendTrace,
        state: &mut TraceStoreState,
    ) -> Result<TraceEvent, TraceStoreError> {
        let conn = &state.conn;
        let event_id = ulid::Ulid::new().to_string();
        let timestamp_json = serde_json::to_string(&record.timestamp)?;
        let response_body_json = match &record.response_body {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        let event_id_for_query = event_id.clone();
        conn.execute(
            r#"
            INSERT INTO trace_events
                (event_id, request_id, kind, method, url, message, event_tag, timestamp, status, response_body, source)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            libsql::params![
                event_id,
                record.request_id,
                record.kind.as_str(),
                record.method,
                record.url,
                record.message,
                record.event_tag,
                timestamp_json,
                record.status.map(|s| s.as_str().to_string()),
                response_body_json,
                record.source.as_str()
            ],
        )
        .await?;

        // libsql doesn't support RETURNING, so re-select the inserted row
        let mut rows = conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM trace_events WHERE event_id = ?1"),
                [event_id_for_query.as_str()],
            )
            .await?;

        let row = rows.next().await?.ok_or(TraceStoreError::NotFound(0))?;
        decode_row(&row)
    }

    async fn handle_get_recent(
        &self,
        limit: i64,
        source: Option<EventSource>,
        request_id: Option<String>,
        state: &mut TraceStoreState,
    ) -> Result<Vec<TraceEvent>, TraceStoreError> {
        let conn = &state.conn;
        let safe_limit = limit.clamp(1, 1000);

        let mut rows = conn
            .query(
                &format!(
                    r#"
                    SELECT {SELECT_COLUMNS}
                    FROM trace_events
                    WHERE (?1 IS NULL OR source = ?1)
                      AND (?2 IS NULL OR request_id = ?2)
                    ORDER BY seq DESC
                    LIMIT ?3
                    "#
                ),
                libsql::params![
                    source.map(|s| s.as_str().to_string()),
                    request_id,
                    safe_limit
                ],
            )
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            match decode_row(&row) {
                Ok(event) => events.push(event),
                // One corrupt row must not poison the batch.
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable trace row"),
            }
        }

        // The recency query walks backwards; hand batches out in store order.
        events.reverse();
        Ok(events)
    }

    async fn handle_get_by_seq(
        &self,
        seq: i64,
        state: &mut TraceStoreState,
    ) -> Result<Option<TraceEvent>, TraceStoreError> {
        let conn = &state.conn;

        let mut rows = conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM trace_events WHERE seq = ?1"),
                [seq],
            )
            .await?;

        match rows.next().await? {
            Some(row) => decode_row(&row).map(Some),
            None => Ok(None),
        }
    }
}

fn decode_row(row: &libsql::Row) -> Result<TraceEvent, TraceStoreError> {
    let kind_raw: String = row.get(3)?;
    let kind = kind_raw
        .parse::<EventKind>()
        .map_err(TraceStoreError::CorruptRow)?;

    // Unknown timestamp shapes degrade to Missing and sort last downstream.
    let timestamp_raw: String = row.get(8)?;
    let timestamp = match serde_json::from_str::<RawTimestamp>(&timestamp_raw) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::warn!(error = %e, raw = %timestamp_raw, "Unreadable trace timestamp");
            RawTimestamp::Missing
        }
    };

    let status = match row.get::<Option<String>>(9)? {
        Some(raw) => match raw.parse::<EventStatus>() {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(error = %e, "Unknown trace status value");
                None
            }
        },
        None => None,
    };

    // A body that no longer parses stays available as its raw string form.
    let response_body = row.get::<Option<String>>(10)?.map(|raw| {
        serde_json::from_str::<serde_json::Value>(&raw)
            .unwrap_or(serde_json::Value::String(raw))
    });

    let source_raw: String = row.get(11)?;
    let source = source_raw.parse::<EventSource>().unwrap_or_default();

    Ok(TraceEvent {
        seq: row.get(0)?,
        event_id: row.get(1)?,
        request_id: row.get(2)?,
        kind,
        method: row.get(4)?,
        url: row.get(5)?,
        message: row.get(6)?,
        event_tag: row.get(7)?,
        timestamp,
        status,
        response_body,
        source,
    })
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convenience function to append a trace event
pub async fn append_trace(
    store: &ActorRef<TraceStoreMsg>,
    record: AppendTrace,
) -> Result<Result<TraceEvent, TraceStoreError>, ractor::RactorErr<TraceStoreMsg>> {
    ractor::call!(store, |reply| TraceStoreMsg::Append { record, reply })
}

/// Convenience function to fetch recent trace events with optional filters
pub async fn get_recent_traces(
    store: &ActorRef<TraceStoreMsg>,
    limit: i64,
    source: Option<EventSource>,
    request_id: Option<String>,
) -> Result<Result<Vec<TraceEvent>, TraceStoreError>, ractor::RactorErr<TraceStoreMsg>> {
    ractor::call!(store, |reply| TraceStoreMsg::GetRecent {
        limit,
        source,
        request_id,
        reply,
    })
}

/// Convenience function to fetch one trace event by sequence number
pub async fn get_trace_by_seq(
    store: &ActorRef<TraceStoreMsg>,
    seq: i64,
) -> Result<Result<Option<TraceEvent>, TraceStoreError>, ractor::RactorErr<TraceStoreMsg>> {
    ractor::call!(store, |reply| TraceStoreMsg::GetBySeq { seq, reply })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ractor::Actor;

    fn sample_record(request_id: &str, source: EventSource) -> AppendTrace {
        AppendTrace {
            request_id: request_id.to_string(),
            kind: EventKind::RequestComplete,
            method: Some("GET".to_string()),
            url: Some("https://portal.example/api/protocol/data/XYZ".to_string()),
            message: None,
            event_tag: None,
            timestamp: RawTimestamp::Text("2026-03-01T10:00:00Z".to_string()),
            status: Some(EventStatus::Success),
            response_body: Some(serde_json::json!({"data": {}})),
            source,
        }
    }

    #[tokio::test]
    async fn test_append_and_retrieve_trace() {
        let (store_ref, _handle) =
            Actor::spawn(None, TraceStoreActor, TraceStoreArguments::InMemory)
                .await
                .unwrap();

        let event = append_trace(&store_ref, sample_record("req-1", EventSource::Web))
            .await
            .unwrap()
            .unwrap();

        assert!(event.seq > 0);
        assert_eq!(event.kind, EventKind::RequestComplete);
        assert_eq!(event.request_id, "req-1");
        assert_eq!(event.source, EventSource::Web);
        assert_eq!(
            event.timestamp,
            RawTimestamp::Text("2026-03-01T10:00:00Z".to_string())
        );

        let events = get_recent_traces(&store_ref, 10, None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, event.event_id);

        store_ref.stop(None);
    }

    #[tokio::test]
    async fn test_recent_returns_latest_in_store_order() {
        let (store_ref, _handle) =
            Actor::spawn(None, TraceStoreActor, TraceStoreArguments::InMemory)
                .await
                .unwrap();

        for i in 0..5 {
            append_trace(&store_ref, sample_record(&format!("req-{i}"), EventSource::Web))
                .await
                .unwrap()
                .unwrap();
        }

        let events = get_recent_traces(&store_ref, 3, None, None)
            .await
            .unwrap()
            .unwrap();

        // Last three rows, ascending store order.
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].request_id, "req-2");
        assert_eq!(events[2].request_id, "req-4");
        assert!(events[0].seq < events[1].seq && events[1].seq < events[2].seq);

        store_ref.stop(None);
    }

    #[tokio::test]
    async fn test_recent_filters_by_source_and_request_id() {
        let (store_ref, _handle) =
            Actor::spawn(None, TraceStoreActor, TraceStoreArguments::InMemory)
                .await
                .unwrap();

        append_trace(&store_ref, sample_record("req-web", EventSource::Web))
            .await
            .unwrap()
            .unwrap();
        append_trace(&store_ref, sample_record("req-api", EventSource::Api))
            .await
            .unwrap()
            .unwrap();

        let api_only = get_recent_traces(&store_ref, 10, Some(EventSource::Api), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(api_only.len(), 1);
        assert_eq!(api_only[0].request_id, "req-api");

        let by_request = get_recent_traces(&store_ref, 10, None, Some("req-web".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_request.len(), 1);
        assert_eq!(by_request[0].source, EventSource::Web);

        store_ref.stop(None);
    }

    #[tokio::test]
    async fn test_heterogeneous_timestamps_round_trip() {
        let (store_ref, _handle) =
            Actor::spawn(None, TraceStoreActor, TraceStoreArguments::InMemory)
                .await
                .unwrap();

        let mut millis = sample_record("req-millis", EventSource::Web);
        millis.timestamp = RawTimestamp::Millis(1_700_000_000_000);
        let mut missing = sample_record("req-missing", EventSource::Web);
        missing.timestamp = RawTimestamp::Missing;

        let stored_millis = append_trace(&store_ref, millis).await.unwrap().unwrap();
        let stored_missing = append_trace(&store_ref, missing).await.unwrap().unwrap();

        assert_eq!(stored_millis.timestamp, RawTimestamp::Millis(1_700_000_000_000));
        assert_eq!(stored_missing.timestamp, RawTimestamp::Missing);

        store_ref.stop(None);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("traces.db");
        let path = db_path.to_str().unwrap().to_string();

        let (store_ref, _handle) =
            Actor::spawn(None, TraceStoreActor, TraceStoreArguments::File(path.clone()))
                .await
                .unwrap();
        append_trace(&store_ref, sample_record("req-persist", EventSource::Web))
            .await
            .unwrap()
            .unwrap();
        store_ref.stop(None);

        let (reopened, _handle) =
            Actor::spawn(None, TraceStoreActor, TraceStoreArguments::File(path))
                .await
                .unwrap();
        let events = get_recent_traces(&reopened, 10, None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_id, "req-persist");

        reopened.stop(None);
    }

    #[tokio::test]
    async fn test_get_by_seq() {
        let (store_ref, _handle) =
            Actor::spawn(None, TraceStoreActor, TraceStoreArguments::InMemory)
                .await
                .unwrap();

        let stored = append_trace(&store_ref, sample_record("req-1", EventSource::Web))
            .await
            .unwrap()
            .unwrap();

        let found = get_trace_by_seq(&store_ref, stored.seq)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.unwrap().event_id, stored.event_id);

        let missing = get_trace_by_seq(&store_ref, 9999).await.unwrap().unwrap();
        assert!(missing.is_none());

        store_ref.stop(None);
    }
}
