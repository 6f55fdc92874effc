use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::http::server::AppState;
use crate::monitor::{GlobalView, IngestOutcome, InstanceSummary, ProcessReport, StatusSnapshot};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub instances: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        instances: state.aggregator.instance_count(),
    })
}

/// Accept a pushed report. Stale sequences are answered with 409 so the
/// sender can tell them apart from transport failures.
pub async fn ingest_report(State(state): State<AppState>, Json(report): Json<ProcessReport>) -> StatusCode {
    let instance_id = report.instance_id;
    let sequence = report.sequence;

    match state.aggregator.ingest(report) {
        IngestOutcome::Accepted => StatusCode::ACCEPTED,
        IngestOutcome::OutOfOrder => {
            tracing::debug!(instance_id = %instance_id, sequence, "Dropped out-of-order report");
            StatusCode::CONFLICT
        }
    }
}

pub async fn global_status(State(state): State<AppState>) -> Json<GlobalView> {
    Json(state.aggregator.global_view())
}

pub async fn list_instances(State(state): State<AppState>) -> Json<Vec<InstanceSummary>> {
    Json(state.aggregator.instances())
}

/// Latest snapshot of this process's own breakers.
pub async fn local_snapshot(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, StatusCode> {
    let monitor = state.monitor.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(monitor.latest().as_ref().clone()))
}

/// Operator override: force a local breaker back to Closed.
pub async fn reset_breaker(State(state): State<AppState>, Path(name): Path<String>) -> StatusCode {
    let Some(breaker) = state.fleet.as_ref().and_then(|fleet| fleet.breaker(&name)) else {
        return StatusCode::NOT_FOUND;
    };

    breaker.reset();
    tracing::info!(dependency = %name, "Breaker reset by operator");
    StatusCode::NO_CONTENT
}
