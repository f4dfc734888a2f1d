//! Read-only diagnostics plus the manual reconnect affordance.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use pulse_telemetry::LogQuery;
use serde::Deserialize;
use serde_json::json;

use crate::server::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "services_open": state.manager.open_count(),
        "services_total": state.manager.endpoints().len(),
    }))
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "connections": state.manager.get_connection_status(),
        "services": state.manager.service_statuses(),
        "link": state.manager.stats(),
        "metrics": state.manager.metrics(),
        "tracker": state.tracker.stats(),
        "listeners": state.manager.dispatcher().listener_count(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestsParams {
    pub service: Option<String>,
    pub limit: Option<usize>,
}

pub async fn requests(
    State(state): State<AppState>,
    Query(params): Query<RequestsParams>,
) -> impl IntoResponse {
    let mut records = match params.service.as_deref() {
        Some(service) => state.tracker.records_for(service),
        None => state.tracker.records(),
    };
    if let Some(limit) = params.limit {
        records.truncate(limit);
    }
    Json(json!({
        "count": records.len(),
        "capacity": state.tracker.capacity(),
        "requests": records,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub level: Option<String>,
    pub service: Option<String>,
    pub limit: Option<usize>,
}

pub async fn logs(
    State(state): State<AppState>,
    Query(params): Query<LogsParams>,
) -> impl IntoResponse {
    let records = state.logs.query(&LogQuery {
        level: params.level,
        service: params.service,
        limit: params.limit,
    });
    Json(json!({ "logs": records }))
}

pub async fn reconnect(State(state): State<AppState>) -> impl IntoResponse {
    state.manager.reconnect_all();
    Json(json!({
        "reconnecting": true,
        "services": state.manager.service_statuses(),
    }))
}
