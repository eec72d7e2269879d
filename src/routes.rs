//! HTTP routes for the tickwatch service.
//!
//! Reporting surfaces consume screening runs and decisions; the holdings
//! endpoints are the write path into the store. Nothing here touches
//! evaluation internals.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::data::fetch_with_timeout;
use crate::decision::Decision;
use crate::monitor::{MonitorStatus, TriggerEvent};
use crate::portfolio::{AddHolding, Holding};
use crate::scheduler::{ScanHistoryEntry, SchedulerStatus};
use crate::screener::ScreenRun;
use crate::WatchState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

#[derive(Debug, Deserialize)]
pub struct ScreenRequest {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub universe: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ScreenStatusResponse {
    pub status: SchedulerStatus,
    pub history: Vec<ScanHistoryEntry>,
    pub presets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HoldingsResponse {
    pub holdings: Vec<Holding>,
    pub count: usize,
    pub total_cost_basis: f64,
}

#[derive(Debug, Deserialize)]
pub struct ReduceRequest {
    pub quantity: f64,
}

#[derive(Debug, Serialize)]
pub struct ReduceResponse {
    /// Remaining holding; None when the reduction closed the position
    pub holding: Option<Holding>,
    pub closed: bool,
}

#[derive(Debug, Serialize)]
pub struct MonitorStatusResponse {
    pub status: MonitorStatus,
    pub recent_events: Vec<TriggerEvent>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionQuery {
    #[serde(default)]
    pub preset: Option<String>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "tickwatch".to_string(),
    })
}

/// Trigger a screening run
pub async fn run_screen(
    State(state): State<Arc<WatchState>>,
    Json(request): Json<ScreenRequest>,
) -> Result<Json<ScreenRun>, ApiError> {
    state
        .scheduler
        .trigger_scan(request.preset.as_deref(), request.universe)
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))
}

/// Latest completed screening run
pub async fn latest_screen(
    State(state): State<Arc<WatchState>>,
) -> Result<Json<ScreenRun>, ApiError> {
    state
        .scheduler
        .latest_result()
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "no completed screening run"))
}

/// Scheduler status and scan history
pub async fn screen_status(State(state): State<Arc<WatchState>>) -> Json<ScreenStatusResponse> {
    Json(ScreenStatusResponse {
        status: state.scheduler.status().await,
        history: state.scheduler.history(20).await,
        presets: state.registry.names(),
    })
}

/// List open holdings
pub async fn get_holdings(State(state): State<Arc<WatchState>>) -> Json<HoldingsResponse> {
    let holdings = state.holdings.snapshot().await;
    let total_cost_basis = holdings.iter().map(|h| h.cost_basis()).sum();
    Json(HoldingsResponse {
        count: holdings.len(),
        total_cost_basis,
        holdings,
    })
}

/// Open a position or merge an add-on buy
pub async fn add_holding(
    State(state): State<Arc<WatchState>>,
    Json(request): Json<AddHolding>,
) -> Result<Json<Holding>, ApiError> {
    state
        .holdings
        .add(request)
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

/// Reduce (partially sell) a holding
pub async fn reduce_holding(
    State(state): State<Arc<WatchState>>,
    Path(ticker): Path<String>,
    Json(request): Json<ReduceRequest>,
) -> Result<Json<ReduceResponse>, ApiError> {
    state
        .holdings
        .reduce(&ticker, request.quantity)
        .await
        .map(|holding| {
            let closed = holding.is_none();
            Json(ReduceResponse { holding, closed })
        })
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

/// Remove a holding outright
pub async fn remove_holding(
    State(state): State<Arc<WatchState>>,
    Path(ticker): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.holdings.remove(&ticker).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "no such holding"))
    }
}

/// Monitor status and recent trigger events
pub async fn monitor_status(State(state): State<Arc<WatchState>>) -> Json<MonitorStatusResponse> {
    Json(MonitorStatusResponse {
        status: state.monitor.status().await,
        recent_events: state.monitor.recent_events(20).await,
    })
}

/// Score a ticker against a preset's conditions
pub async fn get_decision(
    State(state): State<Arc<WatchState>>,
    Path(ticker): Path<String>,
    Query(query): Query<DecisionQuery>,
) -> Result<Json<Decision>, ApiError> {
    let preset_name = query
        .preset
        .as_deref()
        .unwrap_or(&state.config.screener.preset);

    let specs = state
        .registry
        .get(preset_name)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    // Evaluate each leg separately so every condition becomes its own
    // scoring signal.
    let conditions = specs
        .iter()
        .map(|spec| spec.build())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let required = conditions
        .iter()
        .map(|c| c.required_lookback())
        .max()
        .unwrap_or(1);
    let min_bars = required + state.config.screener.lookback_buffer;
    let timeout = Duration::from_secs(state.config.screener.fetch_timeout_secs);

    let bars = fetch_with_timeout(&state.source, &ticker, min_bars, timeout)
        .await
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e))?;

    let mut results = Vec::with_capacity(conditions.len());
    for condition in &conditions {
        let result = condition
            .evaluate(&ticker, &bars)
            .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))?;
        results.push(result);
    }

    let decision = state.scorer.score_results(&ticker, &results);
    Ok(Json(decision))
}
