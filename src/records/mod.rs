// src/records/mod.rs

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::LogbookError;
use crate::models::{Category, Priority, Record, RecordDetails};
use crate::store::LogbookStore;

pub mod category;

pub const MAX_AGE: u8 = 150;

// ─────────────────────────────────────────────────────────────────────────────
// Request models
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub patient_id: String,
    pub name: String,
    pub age: u8,
    pub national_id: String,
    pub responsible_surgeon: String,
    pub room: String,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub details: RecordDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    pub patient_id: Option<String>,
    pub name: Option<String>,
    pub age: Option<u8>,
    pub national_id: Option<String>,
    pub responsible_surgeon: Option<String>,
    pub room: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub surgeon: Option<String>,
    pub text: Option<String>,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        if self.category.is_some_and(|c| c != record.category()) {
            return false;
        }
        if let Some(priority) = self.priority {
            match &record.details {
                RecordDetails::Pending(p) if p.priority == priority => {}
                _ => return false,
            }
        }
        if let Some(surgeon) = self.surgeon.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if !contains_ci(&record.responsible_surgeon, surgeon) {
                return false;
            }
        }
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let hit = [&record.name, &record.national_id, &record.patient_id]
                .iter()
                .any(|field| contains_ci(field, text));
            if !hit {
                return false;
            }
        }
        true
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

pub fn validate_record(record: &Record) -> Result<(), LogbookError> {
    let mut problems = Vec::new();
    let blank = |s: &str| s.trim().is_empty();

    if blank(&record.patient_id) {
        problems.push("patientId is required".to_owned());
    }
    if record.name.trim().chars().count() < 2 {
        problems.push("name must be at least 2 characters".to_owned());
    }
    if record.age > MAX_AGE {
        problems.push(format!("age must be between 0 and {MAX_AGE}"));
    }
    if blank(&record.national_id) {
        problems.push("nationalId is required".to_owned());
    }
    if blank(&record.responsible_surgeon) {
        problems.push("responsibleSurgeon is required".to_owned());
    }
    if blank(&record.room) {
        problems.push("room is required".to_owned());
    }
    problems.extend(category::validate_details(&record.details));

    if problems.is_empty() {
        Ok(())
    } else {
        Err(LogbookError::Validation(problems))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────────────────────────

pub async fn create_record(
    store: &dyn LogbookStore,
    shift_id: &str,
    draft: RecordDraft,
    actor_id: &str,
) -> Result<Record, LogbookError> {
    let shift = store
        .get_shift(shift_id)
        .await?
        .ok_or_else(|| LogbookError::shift_not_found(shift_id))?;
    if shift.closed {
        return Err(LogbookError::AlreadyClosed(shift.id));
    }

    let mut details = draft.details;
    if let RecordDetails::Pending(p) = &mut details {
        p.carry_forward = false;
    }

    let now = Utc::now();
    let record = Record {
        id: uuid::Uuid::new_v4().to_string(),
        shift_id: shift.id.clone(),
        patient_id: draft.patient_id,
        name: draft.name,
        age: draft.age,
        national_id: draft.national_id,
        responsible_surgeon: draft.responsible_surgeon,
        room: draft.room,
        notes: draft.notes,
        created_by: actor_id.to_owned(),
        created_at: now,
        updated_at: now,
        details,
    };
    validate_record(&record)?;

    // the shift may have been closed since we looked
    if !store.insert_record(&record).await? {
        return Err(LogbookError::AlreadyClosed(shift.id));
    }
    info!(record_id = %record.id, shift_id = %record.shift_id, category = %record.category(), "record created");
    Ok(record)
}

pub async fn get_record(store: &dyn LogbookStore, id: &str) -> Result<Record, LogbookError> {
    store
        .get_record(id)
        .await?
        .ok_or_else(|| LogbookError::record_not_found(id))
}

pub async fn list_records(
    store: &dyn LogbookStore,
    shift_id: &str,
    filter: &RecordFilter,
) -> Result<Vec<Record>, LogbookError> {
    if store.get_shift(shift_id).await?.is_none() {
        return Err(LogbookError::shift_not_found(shift_id));
    }
    let records = store.records_by_shift(shift_id).await?;
    Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
}

/// Patch base fields. The write leaves category and details as they are in the store, so
/// a closure or category change that commits meanwhile is kept.
pub async fn update_record(
    store: &dyn LogbookStore,
    id: &str,
    patch: RecordPatch,
) -> Result<Record, LogbookError> {
    let mut record = get_record(store, id).await?;
    let mut base = record.base();

    if let Some(v) = patch.patient_id { base.patient_id = v; }
    if let Some(v) = patch.name { base.name = v; }
    if let Some(v) = patch.age { base.age = v; }
    if let Some(v) = patch.national_id { base.national_id = v; }
    if let Some(v) = patch.responsible_surgeon { base.responsible_surgeon = v; }
    if let Some(v) = patch.room { base.room = v; }
    if let Some(v) = patch.notes { base.notes = Some(v).filter(|n| !n.trim().is_empty()); }

    let now = Utc::now();
    record.apply_base(base.clone(), now);
    validate_record(&record)?;

    store
        .update_record_base(id, &base, now)
        .await?
        .ok_or_else(|| LogbookError::record_not_found(id))
}

pub async fn delete_record(store: &dyn LogbookStore, id: &str) -> Result<(), LogbookError> {
    if !store.delete_record(id).await? {
        return Err(LogbookError::record_not_found(id));
    }
    info!(record_id = id, "record deleted");
    Ok(())
}
