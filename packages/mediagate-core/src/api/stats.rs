//! `GET /stream/stats` and `GET /stream/stats/{stream_id}`.

use axum::extract::{Path, State};
use axum::Json;

use crate::error::{GatewayError, GatewayResult};

use super::AppState;

pub(super) async fn get_stream_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.stream_registry.prune();

    let active_streams: Vec<_> = state
        .stream_registry
        .active_snapshot()
        .iter()
        .map(|r| r.to_active_json())
        .collect();
    let recent_streams: Vec<_> = state
        .stream_registry
        .recent_snapshot()
        .iter()
        .map(|r| r.to_recent_json())
        .collect();

    let work_loads: serde_json::Map<String, serde_json::Value> = state
        .workloads
        .snapshot()
        .iter()
        .map(|entry| (entry.key().to_string(), serde_json::json!(*entry.value())))
        .collect();

    let client_dc_map: serde_json::Map<String, serde_json::Value> = state
        .config
        .client_dc_map
        .iter()
        .map(|(idx, dc)| (idx.to_string(), serde_json::json!(dc)))
        .collect();

    Json(serde_json::json!({
        "active_streams": active_streams,
        "recent_streams": recent_streams,
        "client_dc_map": client_dc_map,
        "work_loads": work_loads,
    }))
}

pub(super) async fn get_stream_detail(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> GatewayResult<Json<serde_json::Value>> {
    let record = state
        .stream_registry
        .get(&stream_id)
        .ok_or_else(|| GatewayError::StreamNotFound(stream_id.clone()))?;
    Ok(Json(record.to_detail_json()))
}
