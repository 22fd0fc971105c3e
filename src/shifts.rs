// src/shifts.rs

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::LogbookError;
use crate::models::{ArchiveEntry, Equipment, Participant, Shift};
use crate::store::LogbookStore;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShift {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub roster: Vec<Participant>,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterUpdate {
    pub roster: Vec<Participant>,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
}

pub async fn create_shift(store: &dyn LogbookStore, new: NewShift) -> Result<Shift, LogbookError> {
    let started_at = new.started_at.unwrap_or_else(Utc::now);
    if new.ended_at.is_some_and(|end| end <= started_at) {
        return Err(LogbookError::invalid("endedAt must be after startedAt"));
    }

    let mut shift = Shift::open(started_at, new.roster, new.equipment);
    shift.ended_at = new.ended_at;
    store.insert_shift(&shift).await?;
    info!(shift_id = %shift.id, "shift opened");
    Ok(shift)
}

pub async fn get_shift(store: &dyn LogbookStore, id: &str) -> Result<Shift, LogbookError> {
    store
        .get_shift(id)
        .await?
        .ok_or_else(|| LogbookError::shift_not_found(id))
}

pub async fn current_shift(store: &dyn LogbookStore) -> Result<Option<Shift>, LogbookError> {
    Ok(store.current_shift().await?)
}

pub const CLOSED_PAGE: i64 = 50;

pub async fn closed_shifts(
    store: &dyn LogbookStore,
    limit: Option<i64>,
) -> Result<Vec<Shift>, LogbookError> {
    let limit = limit.unwrap_or(CLOSED_PAGE);
    if !(1..=500).contains(&limit) {
        return Err(LogbookError::invalid("limit must be between 1 and 500"));
    }
    Ok(store.closed_shifts(limit).await?)
}

pub async fn update_roster(
    store: &dyn LogbookStore,
    id: &str,
    update: RosterUpdate,
) -> Result<Shift, LogbookError> {
    if !store
        .update_roster(id, &update.roster, &update.equipment, Utc::now())
        .await?
    {
        // tell "missing" apart from "closed"
        let shift = get_shift(store, id).await?;
        return Err(LogbookError::AlreadyClosed(shift.id));
    }
    get_shift(store, id).await
}

pub async fn archive_for_shift(
    store: &dyn LogbookStore,
    shift_id: &str,
) -> Result<Vec<ArchiveEntry>, LogbookError> {
    get_shift(store, shift_id).await?;
    Ok(store.archive_by_shift(shift_id).await?)
}

pub async fn archive_between(
    store: &dyn LogbookStore,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<ArchiveEntry>, LogbookError> {
    if from > to {
        return Err(LogbookError::invalid("`from` must not be after `to`"));
    }
    Ok(store.archive_between(from, to).await?)
}
