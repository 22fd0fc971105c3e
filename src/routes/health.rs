// src/routes/health.rs

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResp {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

/// Liveness plus a cheap store round trip.
pub async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    let store = match state.store.current_shift().await {
        Ok(_) => "ok",
        Err(_) => "unavailable",
    };
    Json(HealthResp { status: "ok", version: env!("CARGO_PKG_VERSION"), store })
}
