//! Cycle reconstructor: the per-scan state machine.
//!
//! With no correlation key on the events, the only reliable recovery signal
//! is expected step order. The scan carries a single open cycle and an
//! expected-step cursor; a `ProtocolFetch` observed while a cycle is still
//! awaiting its submission is proof the caller restarted the flow, so the
//! open cycle is abandoned (left permanently partial) and a fresh one opens
//! immediately; abandoned attempts must not vanish without trace.
//!
//! The state is threaded through an explicit fold rather than captured
//! mutable counters, so the transition function is independently testable.

use chrono::{DateTime, Utc};
use serde::Serialize;

use trace_types::{StepKind, TraceEvent};

use super::step_kind;

/// A reconstructed logical business transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Cycle {
    /// Sequentially assigned per reconstruction run, in first-seen order
    pub cycle_id: String,
    /// Member events, chronological
    pub steps: Vec<TraceEvent>,
}

impl Cycle {
    /// The distinct canonical step kinds present, in canonical order.
    pub fn kinds_present(&self) -> Vec<StepKind> {
        StepKind::CANONICAL
            .into_iter()
            .filter(|kind| self.steps.iter().any(|step| step_kind(step) == *kind))
            .collect()
    }

    /// Number of the three canonical step kinds present (0-3).
    pub fn completeness(&self) -> usize {
        self.kinds_present().len()
    }

    /// Complete iff all three kinds are present, regardless of order
    /// anomalies within the triple.
    pub fn is_complete(&self) -> bool {
        self.completeness() == 3
    }

    /// Timestamp of the latest member step, for display ordering.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.steps
            .iter()
            .filter_map(|step| step.timestamp.resolve())
            .max()
    }
}

/// Which step the scan is waiting for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedStep {
    AwaitingFetch,
    AwaitingSubmit,
    AwaitingStatus,
}

/// Outcome of one transition of the scan state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Open a new cycle with this event (abandoning any open cycle)
    Open,
    /// Append to the open cycle and advance to the given expectation
    Append(ExpectedStep),
    /// Append to the open cycle and close it
    Close,
    /// The event belongs to no cycle; stray log entries are not an error
    Drop,
}

/// One step of the scan: expected step x observed kind -> action.
///
/// A `ProtocolFetch` always opens a new cycle, whether the scan was idle,
/// mid-cycle (abandonment), or in any other state (fallback safety net).
pub fn transition(expected: ExpectedStep, observed: StepKind) -> Transition {
    match (expected, observed) {
        (_, StepKind::ProtocolFetch) => Transition::Open,
        (ExpectedStep::AwaitingSubmit, StepKind::TenancySubmit) => {
            Transition::Append(ExpectedStep::AwaitingStatus)
        }
        (ExpectedStep::AwaitingStatus, StepKind::StatusCheck) => Transition::Close,
        _ => Transition::Drop,
    }
}

#[derive(Debug)]
struct ScanState {
    /// Index into the output vec of the cycle currently accepting steps
    current: Option<usize>,
    expected: ExpectedStep,
    next_ordinal: u32,
}

/// Reconstruct cycles from a chronologically sorted, normalized event list.
///
/// The output preserves first-seen cycle order; partial cycles stay in the
/// output and callers must not assume completeness. Events with unknown
/// timestamps arrive last from the normalizer and still run through the
/// machine normally.
pub fn reconstruct(sorted: &[TraceEvent]) -> Vec<Cycle> {
    let mut cycles: Vec<Cycle> = Vec::new();
    let mut state = ScanState {
        current: None,
        expected: ExpectedStep::AwaitingFetch,
        next_ordinal: 1,
    };

    for event in sorted {
        let observed = step_kind(event);
        if observed == StepKind::Other {
            // Non-step events never open, close, or interrupt a cycle.
            continue;
        }

        match transition(state.expected, observed) {
            Transition::Open => {
                if state.expected == ExpectedStep::AwaitingSubmit {
                    if let Some(index) = state.current {
                        tracing::debug!(
                            cycle_id = %cycles[index].cycle_id,
                            "Abandoning open cycle on restarted flow"
                        );
                    }
                }
                cycles.push(Cycle {
                    cycle_id: format!("cycle-{}", state.next_ordinal),
                    steps: vec![event.clone()],
                });
                state = ScanState {
                    current: Some(cycles.len() - 1),
                    expected: ExpectedStep::AwaitingSubmit,
                    next_ordinal: state.next_ordinal + 1,
                };
            }
            Transition::Append(next_expected) => {
                let Some(index) = state.current else {
                    continue;
                };
                cycles[index].steps.push(event.clone());
                state.expected = next_expected;
            }
            Transition::Close => {
                let Some(index) = state.current else {
                    continue;
                };
                cycles[index].steps.push(event.clone());
                state = ScanState {
                    current: None,
                    expected: ExpectedStep::AwaitingFetch,
                    next_ordinal: state.next_ordinal,
                };
            }
            Transition::Drop => {}
        }
    }

    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::normalize::normalize;
    use crate::trace::testing::*;
    use trace_types::{EventKind, SourceFilter};

    #[test]
    fn test_transition_table() {
        use ExpectedStep::*;
        use StepKind::*;

        assert_eq!(transition(AwaitingFetch, ProtocolFetch), Transition::Open);
        assert_eq!(
            transition(AwaitingSubmit, TenancySubmit),
            Transition::Append(AwaitingStatus)
        );
        // A second fetch while awaiting the submission abandons the cycle.
        assert_eq!(transition(AwaitingSubmit, ProtocolFetch), Transition::Open);
        assert_eq!(transition(AwaitingStatus, StatusCheck), Transition::Close);
        // Fallback: a fetch in any state opens a new cycle.
        assert_eq!(transition(AwaitingStatus, ProtocolFetch), Transition::Open);
        // Everything else is dropped.
        assert_eq!(transition(AwaitingFetch, TenancySubmit), Transition::Drop);
        assert_eq!(transition(AwaitingFetch, StatusCheck), Transition::Drop);
        assert_eq!(transition(AwaitingSubmit, StatusCheck), Transition::Drop);
        assert_eq!(transition(AwaitingStatus, TenancySubmit), Transition::Drop);
    }

    #[test]
    fn test_single_complete_cycle() {
        let events = vec![
            protocol_fetch(1, "XYZ", "2026-03-01T10:00:00Z"),
            tenancy_submit(2, "2026-03-01T10:00:10Z"),
            status_check(3, "C1", "2026-03-01T10:00:20Z"),
        ];

        let cycles = reconstruct(&events);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].cycle_id, "cycle-1");
        assert_eq!(cycles[0].completeness(), 3);
        assert!(cycles[0].is_complete());
        let seqs: Vec<i64> = cycles[0].steps.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_back_to_back_cycles_stay_separate() {
        let events = vec![
            protocol_fetch(1, "A", "2026-03-01T10:00:00Z"),
            tenancy_submit(2, "2026-03-01T10:00:10Z"),
            status_check(3, "CA", "2026-03-01T10:00:20Z"),
            protocol_fetch(4, "B", "2026-03-01T11:00:00Z"),
            tenancy_submit(5, "2026-03-01T11:00:10Z"),
            status_check(6, "CB", "2026-03-01T11:00:20Z"),
        ];

        let cycles = reconstruct(&events);
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].cycle_id, "cycle-1");
        assert_eq!(cycles[1].cycle_id, "cycle-2");
        assert!(cycles[0].is_complete());
        assert!(cycles[1].is_complete());
        let first: Vec<i64> = cycles[0].steps.iter().map(|s| s.seq).collect();
        let second: Vec<i64> = cycles[1].steps.iter().map(|s| s.seq).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![4, 5, 6]);
    }

    #[test]
    fn test_abandoned_cycle_stays_partial() {
        // Fetch A, fetch B (no intervening submit), then B completes.
        let events = vec![
            protocol_fetch(1, "A", "2026-03-01T10:00:00Z"),
            protocol_fetch(2, "B", "2026-03-01T10:00:05Z"),
            tenancy_submit(3, "2026-03-01T10:00:10Z"),
            status_check(4, "CB", "2026-03-01T10:00:20Z"),
        ];

        let cycles = reconstruct(&events);
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].completeness(), 1);
        assert_eq!(cycles[0].steps.len(), 1);
        assert_eq!(cycles[0].steps[0].seq, 1);
        assert_eq!(cycles[1].completeness(), 3);
        let second: Vec<i64> = cycles[1].steps.iter().map(|s| s.seq).collect();
        assert_eq!(second, vec![2, 3, 4]);
    }

    #[test]
    fn test_stray_steps_are_dropped_silently() {
        // A status check with no open cycle, a submit before any fetch.
        let events = vec![
            status_check(1, "C0", "2026-03-01T09:59:00Z"),
            tenancy_submit(2, "2026-03-01T09:59:30Z"),
            protocol_fetch(3, "A", "2026-03-01T10:00:00Z"),
            tenancy_submit(4, "2026-03-01T10:00:10Z"),
            // Duplicate submit while awaiting status: dropped.
            tenancy_submit(5, "2026-03-01T10:00:15Z"),
            status_check(6, "CA", "2026-03-01T10:00:20Z"),
        ];

        let cycles = reconstruct(&events);
        assert_eq!(cycles.len(), 1);
        let seqs: Vec<i64> = cycles[0].steps.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![3, 4, 6]);
    }

    #[test]
    fn test_noise_immunity() {
        let clean = vec![
            protocol_fetch(1, "A", "2026-03-01T10:00:00Z"),
            tenancy_submit(2, "2026-03-01T10:00:10Z"),
            status_check(3, "CA", "2026-03-01T10:00:20Z"),
        ];

        // Same stream with REQUEST_START twins and probe custom events
        // injected everywhere.
        let mut start_twin = protocol_fetch(10, "A", "2026-03-01T10:00:00Z");
        start_twin.kind = EventKind::RequestStart;
        let mut submit_twin = tenancy_submit(11, "2026-03-01T10:00:09Z");
        submit_twin.kind = EventKind::RequestStart;
        let mut probe = complete_event(12, "GET", "https://x/ping", "2026-03-01T10:00:05Z");
        probe.kind = EventKind::CustomEvent;
        probe.method = None;
        probe.url = None;
        probe.message = Some("connectivity probe ok".to_string());

        let noisy = vec![
            start_twin,
            clean[0].clone(),
            probe.clone(),
            submit_twin,
            clean[1].clone(),
            probe,
            clean[2].clone(),
        ];

        let from_clean = reconstruct(&normalize(clean, SourceFilter::All));
        let from_noisy = reconstruct(&normalize(noisy, SourceFilter::All));

        assert_eq!(from_clean.len(), from_noisy.len());
        for (a, b) in from_clean.iter().zip(from_noisy.iter()) {
            assert_eq!(a.cycle_id, b.cycle_id);
            let left: Vec<i64> = a.steps.iter().map(|s| s.seq).collect();
            let right: Vec<i64> = b.steps.iter().map(|s| s.seq).collect();
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_determinism_under_input_reordering() {
        let events = vec![
            protocol_fetch(1, "A", "2026-03-01T10:00:00Z"),
            tenancy_submit(2, "2026-03-01T10:00:10Z"),
            status_check(3, "CA", "2026-03-01T10:00:20Z"),
            protocol_fetch(4, "B", "2026-03-01T11:00:00Z"),
        ];
        let mut reversed = events.clone();
        reversed.reverse();

        let a = reconstruct(&normalize(events, SourceFilter::All));
        let b = reconstruct(&normalize(reversed, SourceFilter::All));

        assert_eq!(a.len(), b.len());
        for (left, right) in a.iter().zip(b.iter()) {
            assert_eq!(left.cycle_id, right.cycle_id);
            let ls: Vec<i64> = left.steps.iter().map(|s| s.seq).collect();
            let rs: Vec<i64> = right.steps.iter().map(|s| s.seq).collect();
            assert_eq!(ls, rs);
        }
    }

    #[test]
    fn test_unknown_timestamps_still_drive_the_machine() {
        use trace_types::RawTimestamp;

        let fetch = protocol_fetch(1, "A", "2026-03-01T10:00:00Z");
        let mut submit = tenancy_submit(2, "ignored");
        submit.timestamp = RawTimestamp::Text("garbage".to_string());
        let mut status = status_check(3, "CA", "ignored");
        status.timestamp = RawTimestamp::Missing;

        // Normalizer puts the unparseable pair last in arrival order; they
        // still complete the cycle.
        let cycles = reconstruct(&normalize(vec![fetch, submit, status], SourceFilter::All));
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].completeness(), 3);
    }

    #[test]
    fn test_cycle_latest_timestamp() {
        let cycle = Cycle {
            cycle_id: "cycle-1".to_string(),
            steps: vec![
                protocol_fetch(1, "A", "2026-03-01T10:00:00Z"),
                status_check(2, "CA", "2026-03-01T12:00:00Z"),
                tenancy_submit(3, "2026-03-01T11:00:00Z"),
            ],
        };
        assert_eq!(
            cycle.latest_timestamp(),
            trace_types::RawTimestamp::Text("2026-03-01T12:00:00Z".to_string()).resolve()
        );
    }
}
