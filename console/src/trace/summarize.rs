//! Cycle summarizer: aggregate status, display label, presentation order.

use std::cmp::Ordering;

use serde::Serialize;

use trace_types::{EventStatus, StepKind};

use super::extract::CycleEntities;
use super::reconstruct::Cycle;

/// Aggregate status of a reconstructed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    Success,
    Error,
    Pending,
}

/// Human-facing summary of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub status: CycleStatus,
    pub label: String,
    pub steps_present: Vec<StepKind>,
}

/// Derive a cycle's aggregate status and display summary.
///
/// Status: ERROR if any member errored; SUCCESS only once every member
/// reached a terminal status; PENDING otherwise. The label prefers the
/// extracted entity over a generic step count.
pub fn summarize(cycle: &Cycle, entities: &CycleEntities) -> CycleSummary {
    CycleSummary {
        status: derive_status(cycle),
        label: build_label(cycle, entities),
        steps_present: cycle.kinds_present(),
    }
}

fn derive_status(cycle: &Cycle) -> CycleStatus {
    let mut all_terminal = true;
    for step in &cycle.steps {
        match step.status {
            Some(EventStatus::Error) => return CycleStatus::Error,
            Some(status) if status.is_terminal() => {}
            // PENDING or unknown: not terminal yet.
            _ => all_terminal = false,
        }
    }
    if all_terminal && !cycle.steps.is_empty() {
        CycleStatus::Success
    } else {
        CycleStatus::Pending
    }
}

fn build_label(cycle: &Cycle, entities: &CycleEntities) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !entities.tenant.name.is_empty() {
        parts.push(entities.tenant.name.clone());
    }
    if !entities.tenant.address.is_empty() {
        parts.push(entities.tenant.address.clone());
    }
    if parts.is_empty() && !entities.token().is_empty() {
        parts.push(format!("application {}", entities.token()));
    }
    if !parts.is_empty() {
        return parts.join(", ");
    }

    // Generic fallback: which of the three step kinds are present, in
    // canonical order.
    let present = cycle.kinds_present();
    let names: Vec<&str> = present.iter().map(|kind| kind.label()).collect();
    if names.is_empty() {
        format!("{}/3 steps", present.len())
    } else {
        format!("{}/3 steps ({})", present.len(), names.join(", "))
    }
}

/// Presentation comparator: most recently active cycle first.
///
/// Cycles without a single resolvable timestamp go last; ties are left to
/// the underlying stable sort.
pub fn display_order(a: &Cycle, b: &Cycle) -> Ordering {
    compare_latest_activity(a.latest_timestamp(), b.latest_timestamp())
}

/// Descending order over optional last-activity timestamps, unknown last.
pub fn compare_latest_activity(
    a: Option<chrono::DateTime<chrono::Utc>>,
    b: Option<chrono::DateTime<chrono::Utc>>,
) -> Ordering {
    match (a, b) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::extract::{extract, BusinessEntity};
    use crate::trace::testing::*;

    fn cycle_of(steps: Vec<trace_types::TraceEvent>) -> Cycle {
        Cycle {
            cycle_id: "cycle-1".to_string(),
            steps,
        }
    }

    #[test]
    fn test_status_error_dominates() {
        let mut steps = vec![
            protocol_fetch(1, "A", "2026-03-01T10:00:00Z"),
            tenancy_submit(2, "2026-03-01T10:00:10Z"),
        ];
        steps[1].status = Some(EventStatus::Error);
        let summary = summarize(&cycle_of(steps), &CycleEntities::default());
        assert_eq!(summary.status, CycleStatus::Error);
    }

    #[test]
    fn test_status_success_requires_all_terminal() {
        let steps = vec![
            protocol_fetch(1, "A", "2026-03-01T10:00:00Z"),
            tenancy_submit(2, "2026-03-01T10:00:10Z"),
            status_check(3, "CA", "2026-03-01T10:00:20Z"),
        ];
        let summary = summarize(&cycle_of(steps), &CycleEntities::default());
        assert_eq!(summary.status, CycleStatus::Success);
    }

    #[test]
    fn test_status_pending_with_nonterminal_member() {
        let mut steps = vec![
            protocol_fetch(1, "A", "2026-03-01T10:00:00Z"),
            status_check(2, "CA", "2026-03-01T10:00:20Z"),
        ];
        steps[1].status = Some(EventStatus::Pending);
        let summary = summarize(&cycle_of(steps), &CycleEntities::default());
        assert_eq!(summary.status, CycleStatus::Pending);

        // Absent status is not terminal either.
        let mut steps = vec![protocol_fetch(1, "A", "2026-03-01T10:00:00Z")];
        steps[0].status = None;
        let summary = summarize(&cycle_of(steps), &CycleEntities::default());
        assert_eq!(summary.status, CycleStatus::Pending);
    }

    #[test]
    fn test_label_prefers_extracted_entity() {
        let mut fetch = protocol_fetch(1, "XYZ", "2026-03-01T10:00:00Z");
        fetch.response_body = Some(serde_json::json!({
            "data": {"Mieter": {"Vorname": "Jane", "Name": "Doe"}}
        }));
        let cycle = cycle_of(vec![fetch]);
        let entities = extract(&cycle.steps);

        let summary = summarize(&cycle, &entities);
        assert_eq!(summary.label, "Jane Doe");
    }

    #[test]
    fn test_label_falls_back_to_token() {
        let cycle = cycle_of(vec![protocol_fetch(1, "XYZ", "2026-03-01T10:00:00Z")]);
        let entities = extract(&cycle.steps);
        let summary = summarize(&cycle, &entities);
        assert_eq!(summary.label, "application XYZ");
    }

    #[test]
    fn test_generic_label_names_present_steps_in_canonical_order() {
        // Steps recorded out of canonical order; the label stays canonical.
        let cycle = cycle_of(vec![
            status_check(1, "CA", "2026-03-01T10:00:20Z"),
            protocol_fetch(2, "ZZ", "2026-03-01T10:00:00Z"),
        ]);

        let summary = summarize(&cycle, &CycleEntities::default());
        assert_eq!(summary.label, "2/3 steps (Protocol Data, Status Check)");
        assert_eq!(
            summary.steps_present,
            vec![StepKind::ProtocolFetch, StepKind::StatusCheck]
        );
    }

    #[test]
    fn test_display_order_latest_first() {
        let older = cycle_of(vec![
            protocol_fetch(1, "A", "2026-03-01T10:00:00Z"),
            status_check(2, "CA", "2026-03-01T10:30:00Z"),
        ]);
        let newer = cycle_of(vec![protocol_fetch(3, "B", "2026-03-01T11:00:00Z")]);
        let unknown = cycle_of(vec![{
            let mut e = protocol_fetch(4, "C", "ignored");
            e.timestamp = trace_types::RawTimestamp::Missing;
            e
        }]);

        let mut cycles = vec![older, unknown, newer];
        cycles.sort_by(display_order);
        let first: Vec<i64> = cycles[0].steps.iter().map(|s| s.seq).collect();
        assert_eq!(first, vec![3]);
        assert!(cycles[2].latest_timestamp().is_none());
    }

    #[test]
    fn test_empty_entity_is_all_empty_strings() {
        let entity = BusinessEntity::default();
        assert_eq!(entity.name, "");
        assert_eq!(entity.address, "");
        assert_eq!(entity.token, "");
    }
}
