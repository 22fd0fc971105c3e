// src/routes/shifts.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::actor::{Actor, Role};
use super::extract::JsonBody;
use super::{ApiError, ApiResult};
use crate::closure::CloseShiftInput;
use crate::models::{ClosureResult, Participant, Shift, ShiftState};
use crate::shifts::{self, NewShift, RosterUpdate};
use crate::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request models
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ClosedQ {
    pub limit: Option<i64>,
}

/// `actorId`/`actorName` fall back to the caller's identity headers.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseBody {
    pub roster: Vec<Participant>,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
}

/// Shift as returned by the API, with its derived lifecycle state.
#[derive(Serialize)]
pub struct ShiftView {
    #[serde(flatten)]
    pub shift: Shift,
    pub state: ShiftState,
}

impl From<Shift> for ShiftView {
    fn from(shift: Shift) -> Self {
        let state = shift.state();
        Self { shift, state }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

pub async fn create_shift(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<NewShift>,
) -> Result<(StatusCode, Json<ShiftView>), ApiError> {
    actor.require(Role::Full)?;
    let shift = shifts::create_shift(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(shift.into())))
}

pub async fn current_shift(
    State(state): State<AppState>,
    _actor: Actor,
) -> ApiResult<Option<ShiftView>> {
    Ok(Json(shifts::current_shift(state.store.as_ref()).await?.map(ShiftView::from)))
}

pub async fn closed_shifts(
    State(state): State<AppState>,
    _actor: Actor,
    Query(q): Query<ClosedQ>,
) -> ApiResult<Vec<ShiftView>> {
    let closed = shifts::closed_shifts(state.store.as_ref(), q.limit).await?;
    Ok(Json(closed.into_iter().map(ShiftView::from).collect()))
}

pub async fn get_shift(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<ShiftView> {
    Ok(Json(shifts::get_shift(state.store.as_ref(), &id).await?.into()))
}

pub async fn update_roster(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RosterUpdate>,
) -> ApiResult<ShiftView> {
    actor.require(Role::Full)?;
    Ok(Json(shifts::update_roster(state.store.as_ref(), &id, body).await?.into()))
}

pub async fn close_shift(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CloseBody>,
) -> ApiResult<ClosureResult> {
    actor.require(Role::Full)?;
    let input = CloseShiftInput {
        shift_id: id,
        roster: body.roster,
        actor_id: body.actor_id.unwrap_or(actor.id),
        actor_name: body.actor_name.unwrap_or(actor.name),
    };
    Ok(Json(state.coordinator.close_shift(input).await?))
}

pub async fn backfill_report(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<ClosureResult> {
    actor.require(Role::Full)?;
    Ok(Json(state.coordinator.backfill_report(&id).await?))
}
