//! Outbound HTTP Call Tracing
//!
//! Emits consistent trace events for every outbound HTTP call the console
//! makes. Every call should emit a `REQUEST_START` event followed by exactly
//! one `REQUEST_COMPLETE` event with a shared `request_id`. Connectivity
//! probes are logged as `CUSTOM_EVENT` so the reconstruction pipeline can
//! strip them as noise.
//!
//! # Bounded Payload Policy
//!
//! Response bodies are capped at 16 KB serialized and sensitive keys are
//! redacted before persistence. A truncated body is stored as its raw string
//! prefix; downstream consumers already treat unparseable bodies as
//! best-effort.

use chrono::Utc;
use ractor::ActorRef;

use crate::actors::trace_store::{AppendTrace, TraceStoreMsg};
use trace_types::{EventKind, EventSource, EventStatus, RawTimestamp, PROBE_EVENT_TAG};

pub const MAX_RESPONSE_BODY_BYTES: usize = 16 * 1024;

pub const SENSITIVE_KEYS: &[&str] = &[
    "authorization",
    "api_key",
    "password",
    "secret",
    "credential",
];

/// In-flight call handle returned by [`TraceRecorder::start_request`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub url: String,
}

/// Appends trace events for outbound HTTP calls to the trace store.
///
/// Appends are fire-and-forget casts; tracing must never slow down or fail
/// the traced call itself.
#[derive(Debug, Clone)]
pub struct TraceRecorder {
    trace_store: ActorRef<TraceStoreMsg>,
    source: EventSource,
}

impl TraceRecorder {
    pub fn new(trace_store: ActorRef<TraceStoreMsg>, source: EventSource) -> Self {
        Self {
            trace_store,
            source,
        }
    }

    /// Log the start of an outbound call and hand back its context.
    pub fn start_request(&self, method: &str, url: &str) -> RequestContext {
        let request_id = uuid::Uuid::new_v4().to_string();

        let record = AppendTrace {
            request_id: request_id.clone(),
            kind: EventKind::RequestStart,
            method: Some(method.to_string()),
            url: Some(url.to_string()),
            message: None,
            event_tag: None,
            timestamp: RawTimestamp::now(),
            status: Some(EventStatus::Pending),
            response_body: None,
            source: self.source,
        };
        self.emit(record);

        RequestContext {
            request_id,
            method: method.to_string(),
            url: url.to_string(),
        }
    }

    /// Log completion of a call, with its (bounded, redacted) response body.
    pub fn complete_request(
        &self,
        ctx: &RequestContext,
        status: EventStatus,
        response_body: Option<&serde_json::Value>,
    ) {
        let record = AppendTrace {
            request_id: ctx.request_id.clone(),
            kind: EventKind::RequestComplete,
            method: Some(ctx.method.clone()),
            url: Some(ctx.url.clone()),
            message: None,
            event_tag: None,
            timestamp: RawTimestamp::now(),
            status: Some(status),
            response_body: response_body.map(bounded_body),
            source: self.source,
        };
        self.emit(record);
    }

    /// Log a failed call. The error text goes into `message`, not the body.
    pub fn fail_request(&self, ctx: &RequestContext, error_message: &str) {
        let record = AppendTrace {
            request_id: ctx.request_id.clone(),
            kind: EventKind::RequestComplete,
            method: Some(ctx.method.clone()),
            url: Some(ctx.url.clone()),
            message: Some(error_message.to_string()),
            event_tag: None,
            timestamp: RawTimestamp::now(),
            status: Some(EventStatus::Error),
            response_body: None,
            source: self.source,
        };
        self.emit(record);
    }

    /// Log a connectivity probe. Pure diagnostic noise: the reconstruction
    /// pipeline filters these before anything is counted.
    pub fn connectivity_probe(&self) {
        let record = AppendTrace {
            request_id: uuid::Uuid::new_v4().to_string(),
            kind: EventKind::CustomEvent,
            method: None,
            url: None,
            message: Some(format!("connectivity probe at {}", Utc::now().to_rfc3339())),
            event_tag: Some(PROBE_EVENT_TAG.to_string()),
            timestamp: RawTimestamp::now(),
            status: Some(EventStatus::Success),
            response_body: None,
            source: self.source,
        };
        self.emit(record);
    }

    fn emit(&self, record: AppendTrace) {
        let _ = self
            .trace_store
            .send_message(TraceStoreMsg::AppendAsync { record });
    }
}

/// Redact and size-cap a response body before it is persisted.
fn bounded_body(body: &serde_json::Value) -> serde_json::Value {
    let mut clone = body.clone();
    redact_sensitive_keys(&mut clone);
    let serialized = serde_json::to_string(&clone).unwrap_or_else(|_| "null".to_string());
    let (bounded, truncated) = truncate_to_bytes(&serialized, MAX_RESPONSE_BODY_BYTES);
    if truncated {
        // The prefix is no longer valid JSON; keep it as a raw string.
        serde_json::Value::String(bounded)
    } else {
        clone
    }
}

pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> (String, bool) {
    if text.len() <= max_bytes {
        return (text.to_string(), false);
    }

    let mut byte_count = 0;
    for (idx, ch) in text.char_indices() {
        let char_len = ch.len_utf8();
        if byte_count + char_len > max_bytes {
            return (text[..idx].to_string(), true);
        }
        byte_count += char_len;
    }

    (text.to_string(), false)
}

pub fn redact_sensitive_keys(json: &mut serde_json::Value) {
    match json {
        serde_json::Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                if SENSITIVE_KEYS.iter().any(|k| key_lower.contains(k)) {
                    *value = serde_json::Value::String("[REDACTED]".to_string());
                } else {
                    redact_sensitive_keys(value);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                redact_sensitive_keys(item);
            }
        }
        _ => {}
    }
}
