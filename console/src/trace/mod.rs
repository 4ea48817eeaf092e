//! Trace-cycle reconstruction pipeline.
//!
//! Recovers the logical multi-step business transaction ("cycle": protocol
//! data fetch → tenancy submission → status poll) from the flat outbound-HTTP
//! trace log, purely from timestamp order and URL/method pattern matching;
//! the events carry no cycle-level correlation key.
//!
//! The pipeline is pure and stateless across invocations: each run consumes
//! one snapshot from the trace store and builds the cycle map from scratch.
//! Data flows one direction: normalize → reconstruct → extract → summarize.

use once_cell::sync::Lazy;
use regex::Regex;

use trace_types::{EventKind, StepKind, TraceEvent};

pub mod extract;
pub mod normalize;
pub mod reconstruct;
pub mod summarize;

pub use extract::{extract, BusinessEntity, CycleEntities};
pub use normalize::normalize;
pub use reconstruct::{reconstruct, Cycle};
pub use summarize::{summarize, CycleStatus, CycleSummary};

static PROTOCOL_DATA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/api/protocol/data/[^/?#]+").expect("valid regex"));
static TENANCY_SUBMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/api/tenancies/?(?:[?#].*)?$").expect("valid regex"));
static APPLICATION_STATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/api/application/state/[^/?#]+").expect("valid regex"));

/// Classify a trace event as one of the canonical cycle steps.
///
/// Only `REQUEST_COMPLETE` events are eligible: the `REQUEST_START` twin of
/// the same physical call must never be double-counted, and custom events
/// carry no URL worth matching.
pub fn step_kind(event: &TraceEvent) -> StepKind {
    if event.kind != EventKind::RequestComplete {
        return StepKind::Other;
    }
    let (Some(method), Some(url)) = (event.method.as_deref(), event.url.as_deref()) else {
        return StepKind::Other;
    };

    match method.to_ascii_uppercase().as_str() {
        "GET" if PROTOCOL_DATA_RE.is_match(url) => StepKind::ProtocolFetch,
        "POST" if TENANCY_SUBMIT_RE.is_match(url) => StepKind::TenancySubmit,
        "GET" if APPLICATION_STATE_RE.is_match(url) => StepKind::StatusCheck,
        _ => StepKind::Other,
    }
}
