//! Trace diagnostics API endpoints.
//!
//! Exposes the raw recent trace log and the reconstructed cycle view. Every
//! cycles request fetches a fresh snapshot from the store and rebuilds the
//! cycle map from scratch; nothing is cached or shared between invocations,
//! so concurrent callers simply get independent views.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use ractor::ActorRef;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ApiState;
use crate::actors::trace_store::TraceStoreMsg;
use crate::trace::summarize::compare_latest_activity;
use crate::trace::{
    extract, normalize, reconstruct, summarize, BusinessEntity, CycleStatus, CycleSummary,
};
use trace_types::{SourceFilter, StepKind, TraceEvent};

const DEFAULT_FETCH_LIMIT: i64 = 500;

fn latest_step_timestamp(steps: &[TraceEvent]) -> Option<chrono::DateTime<chrono::Utc>> {
    steps.iter().filter_map(|step| step.timestamp.resolve()).max()
}

#[derive(Debug, Default, Deserialize)]
pub struct TraceQuery {
    pub limit: Option<i64>,
    pub source: Option<String>,
    pub request_id: Option<String>,
}

/// One reconstructed cycle, ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct CycleView {
    pub cycle_id: String,
    pub status: CycleStatus,
    pub label: String,
    pub steps_present: Vec<StepKind>,
    pub completeness: usize,
    pub complete: bool,
    pub tenant: BusinessEntity,
    pub landlord: BusinessEntity,
    pub token: String,
    pub steps: Vec<TraceEvent>,
}

/// Aggregate statistics over the filtered snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TraceOverview {
    pub events: usize,
    pub cycles: usize,
    pub complete_cycles: usize,
    pub success: usize,
    pub error: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycles: Vec<CycleView>,
    pub overview: TraceOverview,
}

fn parse_source_filter(raw: Option<&str>) -> Result<SourceFilter, String> {
    match raw {
        None => Ok(SourceFilter::All),
        Some(value) => value
            .parse::<SourceFilter>()
            .map_err(|e| format!("bad_request:{e}")),
    }
}

async fn query_events_from_store(
    trace_store: ActorRef<TraceStoreMsg>,
    query: &TraceQuery,
) -> Result<Vec<TraceEvent>, String> {
    let limit = query.limit.unwrap_or(DEFAULT_FETCH_LIMIT).clamp(1, 1000);

    // The store may or may not honor filters; the pipeline re-filters
    // client-side either way, so nothing is passed down here but the
    // request_id selector the store indexes.
    match ractor::call!(trace_store, |reply| TraceStoreMsg::GetRecent {
        limit,
        source: None,
        request_id: query.request_id.clone(),
        reply,
    }) {
        Ok(Ok(events)) => Ok(events),
        Ok(Err(err)) => Err(format!("TraceStore error: {err}")),
        Err(err) => Err(format!("RPC error: {err}")),
    }
}

/// Build the full cycle report from one snapshot.
///
/// Source filtering happens inside `normalize`, before any statistics are
/// computed, so per-source cycle counts stay accurate.
pub fn build_cycle_report(events: Vec<TraceEvent>, filter: SourceFilter) -> CycleReport {
    let normalized = normalize(events, filter);
    let event_count = normalized.len();

    let cycles = reconstruct(&normalized);
    let mut views: Vec<CycleView> = cycles
        .into_iter()
        .map(|cycle| {
            let entities = extract(&cycle.steps);
            let CycleSummary {
                status,
                label,
                steps_present,
            } = summarize(&cycle, &entities);
            CycleView {
                cycle_id: cycle.cycle_id.clone(),
                status,
                label,
                steps_present,
                completeness: cycle.completeness(),
                complete: cycle.is_complete(),
                token: entities.token().to_string(),
                tenant: entities.tenant,
                landlord: entities.landlord,
                steps: cycle.steps,
            }
        })
        .collect();

    views.sort_by(|a, b| {
        compare_latest_activity(
            latest_step_timestamp(&a.steps),
            latest_step_timestamp(&b.steps),
        )
    });

    let overview = TraceOverview {
        events: event_count,
        cycles: views.len(),
        complete_cycles: views.iter().filter(|v| v.complete).count(),
        success: views
            .iter()
            .filter(|v| v.status == CycleStatus::Success)
            .count(),
        error: views
            .iter()
            .filter(|v| v.status == CycleStatus::Error)
            .count(),
        pending: views
            .iter()
            .filter(|v| v.status == CycleStatus::Pending)
            .count(),
    };

    CycleReport {
        cycles: views,
        overview,
    }
}

/// Get recent raw trace events.
pub async fn get_events(
    State(state): State<ApiState>,
    Query(query): Query<TraceQuery>,
) -> impl IntoResponse {
    let filter = match parse_source_filter(query.source.as_deref()) {
        Ok(filter) => filter,
        Err(err) => return bad_request(err),
    };

    match query_events_from_store(state.app_state.trace_store(), &query).await {
        Ok(events) => {
            let events: Vec<TraceEvent> = events
                .into_iter()
                .filter(|event| filter.matches(event.source))
                .collect();
            (StatusCode::OK, Json(json!({ "events": events }))).into_response()
        }
        Err(err) => internal_error(err),
    }
}

/// Export recent trace events as JSONL/NDJSON (one event per line).
pub async fn export_events_jsonl(
    State(state): State<ApiState>,
    Query(query): Query<TraceQuery>,
) -> impl IntoResponse {
    let filter = match parse_source_filter(query.source.as_deref()) {
        Ok(filter) => filter,
        Err(err) => return bad_request(err),
    };

    match query_events_from_store(state.app_state.trace_store(), &query).await {
        Ok(events) => {
            let mut out = String::new();
            for event in events
                .into_iter()
                .filter(|event| filter.matches(event.source))
            {
                match serde_json::to_string(&event) {
                    Ok(line) => {
                        out.push_str(&line);
                        out.push('\n');
                    }
                    Err(e) => return internal_error(format!("Serialization error: {e}")),
                }
            }
            (
                StatusCode::OK,
                [("content-type", "application/x-ndjson; charset=utf-8")],
                out,
            )
                .into_response()
        }
        Err(err) => internal_error(err),
    }
}

/// Get the reconstructed cycle view for the current snapshot.
pub async fn get_cycles(
    State(state): State<ApiState>,
    Query(query): Query<TraceQuery>,
) -> impl IntoResponse {
    let filter = match parse_source_filter(query.source.as_deref()) {
        Ok(filter) => filter,
        Err(err) => return bad_request(err),
    };

    match query_events_from_store(state.app_state.trace_store(), &query).await {
        Ok(events) => {
            let report = build_cycle_report(events, filter);
            (StatusCode::OK, Json(json!(report))).into_response()
        }
        // Store failure is all-or-nothing: no partial cycle map.
        Err(err) => internal_error(err),
    }
}

fn bad_request(err: String) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": err.trim_start_matches("bad_request:") })),
    )
        .into_response()
}

fn internal_error(err: String) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err })),
    )
        .into_response()
}
