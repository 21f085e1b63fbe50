//! HTTP route handlers.
//!
//! Handlers stay thin: all business logic lives in `LifecycleManager` and
//! `MetricsStore`; the router only extracts arguments and shapes responses.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::api::response::{api_ok, api_success};
use crate::api::AppState;
use crate::error::CoreError;
use crate::protocol_constants::SERVICE_ID;

#[derive(Deserialize)]
struct StartRequest {
    channel: String,
    #[serde(default)]
    source_index: Option<usize>,
}

#[derive(Deserialize)]
struct ChannelRequest {
    channel: String,
}

#[derive(Deserialize)]
struct RestartRequest {
    channel: String,
    #[serde(default)]
    source_index: Option<usize>,
}

#[derive(Deserialize, Default)]
struct StatusQuery {
    #[serde(default)]
    channel: Option<String>,
}

#[derive(Deserialize)]
struct ProbeRequest {
    url: String,
}

/// Builds the axum router over `state`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/start", post(start_channel))
        .route("/stop", post(stop_channel))
        .route("/restart", post(restart_channel))
        .route("/status", get(status))
        .route("/list", get(list_channels))
        .route("/metrics/live/{name}", get(metrics_live))
        .route("/metrics/historic/{name}", get(metrics_historic))
        .route("/stats/live/{channel}/{stat_type}", get(stats_live))
        .route("/stats/historic/{channel}/{stat_type}", get(stats_historic))
        .route("/stream/info/{channel}", get(stream_info))
        .route("/probe", post(probe))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    api_success(json!({ "service": SERVICE_ID }))
}

async fn start_channel(State(state): State<AppState>, Json(req): Json<StartRequest>) -> Response {
    match state.lifecycle.start(&req.channel, req.source_index.unwrap_or(0)).await {
        Ok(()) => api_ok(),
        Err(e) => CoreError::from(e).into_response(),
    }
}

async fn stop_channel(State(state): State<AppState>, Json(req): Json<ChannelRequest>) -> Response {
    match state.lifecycle.stop(&req.channel).await {
        Ok(()) => api_ok(),
        Err(e) => CoreError::from(e).into_response(),
    }
}

async fn restart_channel(State(state): State<AppState>, Json(req): Json<RestartRequest>) -> Response {
    match state.lifecycle.restart(&req.channel, req.source_index.unwrap_or(0)).await {
        Ok(()) => api_ok(),
        Err(e) => CoreError::from(e).into_response(),
    }
}

async fn status(State(state): State<AppState>, query: Option<Query<StatusQuery>>) -> Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    match state.lifecycle.status(query.channel.as_deref()) {
        Ok(channels) => api_success(json!({ "channels": channels })),
        Err(e) => CoreError::from(e).into_response(),
    }
}

async fn list_channels(State(state): State<AppState>) -> Response {
    match state.lifecycle.list() {
        Ok(channels) => api_success(json!({ "channels": channels })),
        Err(e) => CoreError::from(e).into_response(),
    }
}

async fn metrics_live(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    api_success(json!({ "channel": name, "samples": state.metrics.live_all(&name) }))
}

async fn metrics_historic(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    api_success(json!({ "channel": name, "samples": state.metrics.historic_all(&name) }))
}

async fn stats_live(State(state): State<AppState>, Path((channel, stat_type)): Path<(String, String)>) -> impl IntoResponse {
    api_success(json!({
        "channel": channel,
        "stat_type": stat_type,
        "samples": state.metrics.live(&channel, &stat_type),
    }))
}

async fn stats_historic(State(state): State<AppState>, Path((channel, stat_type)): Path<(String, String)>) -> impl IntoResponse {
    api_success(json!({
        "channel": channel,
        "stat_type": stat_type,
        "samples": state.metrics.historic(&channel, &stat_type),
    }))
}

async fn stream_info(State(state): State<AppState>, Path(channel): Path<String>) -> Response {
    let listing = match state.lifecycle.list() {
        Ok(listings) => listings,
        Err(e) => return CoreError::from(e).into_response(),
    };
    let Some(entry) = listing.get(&channel) else {
        return CoreError::from(crate::config::ConfigError::UnknownChannel(channel)).into_response();
    };

    api_success(json!({ "channel": channel, "info": entry }))
}

/// Out-of-band reachability probe. Real stream probing is outside this
/// crate's scope; this surfaces the same boundary `health::probe_reachable`
/// stands in for.
async fn probe(Json(req): Json<ProbeRequest>) -> impl IntoResponse {
    api_success(json!({ "url": req.url, "reachable": false }))
}
