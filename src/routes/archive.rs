// src/routes/archive.rs

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::actor::Actor;
use super::ApiResult;
use crate::models::ArchiveEntry;
use crate::shifts;
use crate::AppState;

#[derive(Deserialize)]
pub struct RangeQ {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

pub async fn for_shift(
    State(state): State<AppState>,
    _actor: Actor,
    Path(shift_id): Path<String>,
) -> ApiResult<Vec<ArchiveEntry>> {
    Ok(Json(shifts::archive_for_shift(state.store.as_ref(), &shift_id).await?))
}

pub async fn between(
    State(state): State<AppState>,
    _actor: Actor,
    Query(q): Query<RangeQ>,
) -> ApiResult<Vec<ArchiveEntry>> {
    Ok(Json(shifts::archive_between(state.store.as_ref(), q.from, q.to).await?))
}
