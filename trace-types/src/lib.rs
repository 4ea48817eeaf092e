//! Shared types for the outbound-HTTP trace diagnostics subsystem
//!
//! These types are used by both:
//! - the trace store actor (persistence)
//! - the cycle reconstruction pipeline and its HTTP API
//!
//! Serializable with serde for JSON over HTTP and for storage round-trips.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Trace Events
// ============================================================================

/// One logged lifecycle point of a physical outbound HTTP call.
///
/// Events are immutable once read from the store; the diagnostics engine
/// never writes them back. A `request_id` is unique per physical call, not
/// per business cycle; events carry no cycle-level correlation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Store sequence number (strictly increasing, assigned on append)
    pub seq: i64,

    /// Unique event ID (ULID, assigned on append)
    pub event_id: String,

    /// Identifier of the physical HTTP call this event belongs to
    pub request_id: String,

    /// Lifecycle point
    pub kind: EventKind,

    /// HTTP verb; absent for custom events
    #[serde(default)]
    pub method: Option<String>,

    /// Full request URL; absent for some custom events (see `message`)
    #[serde(default)]
    pub url: Option<String>,

    /// Free-text description, used instead of `url` by custom events
    #[serde(default)]
    pub message: Option<String>,

    /// Classifier tag for custom events (e.g. connectivity probes)
    #[serde(default)]
    pub event_tag: Option<String>,

    /// When the event occurred, as logged by the upstream producer
    #[serde(default)]
    pub timestamp: RawTimestamp,

    /// Call outcome, when known
    #[serde(default)]
    pub status: Option<EventStatus>,

    /// Response payload: either a JSON-serialized string or an
    /// already-parsed structure, depending on which upstream produced it
    #[serde(default)]
    pub response_body: Option<serde_json::Value>,

    /// Origin of the traced call
    #[serde(default)]
    pub source: EventSource,
}

/// Lifecycle point of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    RequestStart,
    RequestComplete,
    CustomEvent,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RequestStart => "REQUEST_START",
            EventKind::RequestComplete => "REQUEST_COMPLETE",
            EventKind::CustomEvent => "CUSTOM_EVENT",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUEST_START" => Ok(EventKind::RequestStart),
            "REQUEST_COMPLETE" => Ok(EventKind::RequestComplete),
            "CUSTOM_EVENT" => Ok(EventKind::CustomEvent),
            _ => Err(format!("unknown event kind: {}", s)),
        }
    }
}

/// Outcome recorded for a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Success,
    Error,
    Pending,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "SUCCESS",
            EventStatus::Error => "ERROR",
            EventStatus::Pending => "PENDING",
        }
    }

    /// A terminal status is anything other than `PENDING`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventStatus::Pending)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(EventStatus::Success),
            "ERROR" => Ok(EventStatus::Error),
            "PENDING" => Ok(EventStatus::Pending),
            _ => Err(format!("unknown event status: {}", s)),
        }
    }
}

/// Origin of a traced call. Defaults to `web` when the producer omitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    #[default]
    Web,
    Api,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Web => "web",
            EventSource::Api => "api",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(EventSource::Web),
            "api" => Ok(EventSource::Api),
            _ => Err(format!("unknown event source: {}", s)),
        }
    }
}

/// Caller-supplied source filter for normalization and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFilter {
    #[default]
    All,
    Only(EventSource),
}

impl SourceFilter {
    pub fn matches(&self, source: EventSource) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Only(wanted) => *wanted == source,
        }
    }
}

impl std::str::FromStr for SourceFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SourceFilter::All),
            other => other.parse::<EventSource>().map(SourceFilter::Only),
        }
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Timestamp value as logged by heterogeneous upstream producers.
///
/// Producers disagree on the wire shape: some log RFC 3339 strings, some a
/// plain SQLite datetime, some a numeric epoch. Each case has its own
/// normalization; anything unparseable resolves to "unknown" and orders
/// last downstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Numeric epoch milliseconds
    Millis(i64),
    /// Fractional epoch seconds
    Seconds(f64),
    /// Textual datetime (RFC 3339 or `%Y-%m-%d %H:%M:%S`)
    Text(String),
    /// Not logged at all
    #[default]
    Missing,
}

impl RawTimestamp {
    /// Capture the current instant in the shape our own recorder logs.
    pub fn now() -> Self {
        RawTimestamp::Text(Utc::now().to_rfc3339())
    }

    /// Normalize to a single comparable time value.
    ///
    /// `None` means unknown; callers order unknown timestamps last.
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Millis(millis) => Utc.timestamp_millis_opt(*millis).single(),
            RawTimestamp::Seconds(seconds) => resolve_epoch_seconds(*seconds),
            RawTimestamp::Text(text) => resolve_text(text),
            RawTimestamp::Missing => None,
        }
    }
}

fn resolve_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn resolve_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    // SQLite datetime format: "2026-01-31 02:24:30"
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| chrono::DateTime::from_naive_utc_and_offset(naive, Utc))
}

// ============================================================================
// Step Classification
// ============================================================================

/// Which canonical cycle step a trace event represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// `GET .../api/protocol/data/<token>`: external protocol data fetch
    ProtocolFetch,
    /// `POST .../api/tenancies`: tenancy application submission
    TenancySubmit,
    /// `GET .../api/application/state/<id>`: application status poll
    StatusCheck,
    /// Anything else; retained for display, excluded from cycles
    Other,
}

impl StepKind {
    /// Canonical display label, in the fixed step order
    /// Protocol Data → Tenancy Submit → Status Check.
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::ProtocolFetch => "Protocol Data",
            StepKind::TenancySubmit => "Tenancy Submit",
            StepKind::StatusCheck => "Status Check",
            StepKind::Other => "Other",
        }
    }

    /// The three canonical step kinds in presentation order.
    pub const CANONICAL: [StepKind; 3] = [
        StepKind::ProtocolFetch,
        StepKind::TenancySubmit,
        StepKind::StatusCheck,
    ];
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Payload Helpers
// ============================================================================

/// Decode a logged response body into a JSON value.
///
/// Producers log either a JSON-serialized string or an already-parsed
/// structure; a string that fails to parse yields `None` (the caller logs
/// and moves on, it never aborts processing).
pub fn decode_response_body(body: &serde_json::Value) -> Option<serde_json::Value> {
    match body {
        serde_json::Value::String(raw) => serde_json::from_str(raw).ok(),
        other => Some(other.clone()),
    }
}

// ============================================================================
// Constants
// ============================================================================

/// URL path fragment of the external protocol-data endpoint.
pub const PROTOCOL_DATA_PATH: &str = "/api/protocol/data/";
/// URL path fragment of the tenancy-submission endpoint.
pub const TENANCY_SUBMIT_PATH: &str = "/api/tenancies";
/// URL path fragment of the application-status endpoint.
pub const APPLICATION_STATE_PATH: &str = "/api/application/state/";

/// Event tag our own recorder puts on connectivity probes.
pub const PROBE_EVENT_TAG: &str = "diagnostics.connectivity_probe";
/// Message marker identifying probes logged by producers without a tag.
pub const PROBE_MESSAGE_MARKER: &str = "connectivity probe";

// ============================================================================
// Tests
// ============================================================================
