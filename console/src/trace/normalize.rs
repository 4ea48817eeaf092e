//! Trace normalizer: noise filtering, source filtering, chronological sort.
//!
//! The store hands back a possibly out-of-order batch with diagnostic noise
//! mixed in. Normalization removes connectivity probes, applies the caller's
//! source filter (before any statistics are computed, so per-source counts
//! stay accurate) and stable-sorts by resolved timestamp. Pure function.

use std::cmp::Ordering;

use trace_types::{
    EventKind, SourceFilter, TraceEvent, PROBE_EVENT_TAG, PROBE_MESSAGE_MARKER,
};

/// Normalize a raw store batch for reconstruction.
///
/// Events with unparseable timestamps sort last; ties keep original store
/// order (stable sort), which makes downstream behavior deterministic for
/// duplicate timestamps.
pub fn normalize(events: Vec<TraceEvent>, filter: SourceFilter) -> Vec<TraceEvent> {
    let mut kept: Vec<TraceEvent> = events
        .into_iter()
        .filter(|event| !is_connectivity_probe(event))
        .filter(|event| filter.matches(event.source))
        .collect();

    kept.sort_by(|a, b| match (a.timestamp.resolve(), b.timestamp.resolve()) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    kept
}

/// Connectivity probes are identified by the recorder's event tag or, for
/// producers that never tagged them, by a message marker.
pub fn is_connectivity_probe(event: &TraceEvent) -> bool {
    if event.kind != EventKind::CustomEvent {
        return false;
    }
    if event.event_tag.as_deref() == Some(PROBE_EVENT_TAG) {
        return true;
    }
    event
        .message
        .as_deref()
        .is_some_and(|message| message.to_ascii_lowercase().contains(PROBE_MESSAGE_MARKER))
}
