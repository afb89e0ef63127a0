// src/handlers/time.rs

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::engine::clock::OffsetClock;

/// Server time in epoch milliseconds, for client clock-offset estimation.
pub async fn server_time(State(clock): State<Arc<OffsetClock>>) -> impl IntoResponse {
    Json(json!({ "serverTime": clock.now_ms() }))
}
