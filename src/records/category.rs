// src/records/category.rs

//! Category changes. What a category needs is data in [`REQUIRED_FIELDS`] and
//! [`MIN_LENGTHS`]; both record validation and the change validator read from them.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::error::LogbookError;
use crate::models::{Category, ChangeHistoryEntry, Record, RecordDetails};
use crate::store::{LogbookStore, StoreTx};

/// Detail fields (wire names) every record of a category must carry.
pub const REQUIRED_FIELDS: &[(Category, &[&str])] = &[
    (
        Category::Operated,
        &["startTime", "endTime", "procedureType", "anesthesiaType"],
    ),
    (
        Category::Pending,
        &["priority", "proposedProcedure", "anesthesiaType", "waitReason"],
    ),
    (
        Category::NonSurgical,
        &["admissionReason", "specialty", "estimatedStay"],
    ),
    (Category::Note, &["noteType", "description", "impact"]),
];

pub const MIN_LENGTHS: &[(Category, &str, usize)] = &[(Category::Note, "description", 10)];

pub fn required_fields(category: Category) -> &'static [&'static str] {
    REQUIRED_FIELDS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

/// Human readable problems with `fields` for `category`; empty when acceptable.
pub fn missing_fields(category: Category, fields: &Map<String, Value>) -> Vec<String> {
    let mut problems = Vec::new();
    for name in required_fields(category) {
        let present = match fields.get(*name) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            problems.push(format!("{name} is required for {category}"));
        }
    }
    for (c, name, min) in MIN_LENGTHS {
        if *c != category {
            continue;
        }
        if let Some(Value::String(s)) = fields.get(*name) {
            let len = s.trim().chars().count();
            if len > 0 && len < *min {
                problems.push(format!("{name} must be at least {min} characters"));
            }
        }
    }
    problems
}

/// Check an already typed details value against the same table.
pub fn validate_details(details: &RecordDetails) -> Vec<String> {
    match serde_json::to_value(details) {
        Ok(Value::Object(map)) => missing_fields(details.category(), &map),
        _ => vec!["details could not be inspected".to_owned()],
    }
}

/// Build typed details for `category` from a loose field map.
pub fn details_from_fields(
    category: Category,
    mut fields: Map<String, Value>,
) -> Result<RecordDetails, LogbookError> {
    let problems = missing_fields(category, &fields);
    if !problems.is_empty() {
        return Err(LogbookError::Validation(problems));
    }
    fields.insert("category".into(), Value::String(category.as_str().into()));
    let mut details: RecordDetails = serde_json::from_value(Value::Object(fields))
        .map_err(|e| LogbookError::invalid(format!("invalid {category} fields: {e}")))?;
    if let RecordDetails::Pending(p) = &mut details {
        // only shift closure sets the flag
        p.carry_forward = false;
    }
    Ok(details)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryChange {
    pub category: Category,
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub note: Option<String>,
}

/// Move a record to another category and append the audit entry, atomically.
#[instrument(skip(store, change), fields(to = %change.category))]
pub async fn change_category(
    store: &dyn LogbookStore,
    record_id: &str,
    change: CategoryChange,
    actor_id: &str,
    actor_name: &str,
) -> Result<(Record, ChangeHistoryEntry), LogbookError> {
    if actor_id.trim().is_empty() || actor_name.trim().is_empty() {
        return Err(LogbookError::invalid("actor id and actor name are required"));
    }
    let details = details_from_fields(change.category, change.fields)?;

    let mut tx = store.begin().await?;
    let applied = apply_change(
        tx.as_mut(),
        record_id,
        details,
        change.note,
        actor_id,
        actor_name,
    )
    .await;

    match applied {
        Ok(changed) => {
            tx.commit().await?;
            info!(
                record_id,
                from = %changed.1.from_category,
                "record category changed"
            );
            Ok(changed)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(error = %rb, "rollback after failed category change");
            }
            Err(e)
        }
    }
}

/// Category changes of a record, newest first. History outlives the record itself.
pub async fn history(
    store: &dyn LogbookStore,
    record_id: &str,
) -> Result<Vec<ChangeHistoryEntry>, LogbookError> {
    let entries = store.history_for_record(record_id).await?;
    if entries.is_empty() && store.get_record(record_id).await?.is_none() {
        return Err(LogbookError::record_not_found(record_id));
    }
    Ok(entries)
}

async fn apply_change(
    tx: &mut dyn StoreTx,
    record_id: &str,
    details: RecordDetails,
    note: Option<String>,
    actor_id: &str,
    actor_name: &str,
) -> Result<(Record, ChangeHistoryEntry), LogbookError> {
    let mut record = tx
        .get_record(record_id)
        .await?
        .ok_or_else(|| LogbookError::record_not_found(record_id))?;

    let from = record.category();
    let to = details.category();
    if from == to {
        return Err(LogbookError::invalid(format!("record is already {to}")));
    }

    let now = Utc::now();
    record.details = details;
    record.updated_at = now;
    tx.replace_record(&record).await?;

    let entry = ChangeHistoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        record_id: record.id.clone(),
        from_category: from,
        to_category: to,
        actor_id: actor_id.to_owned(),
        actor_name: actor_name.to_owned(),
        changed_at: now,
        note: note.filter(|n| !n.trim().is_empty()),
    };
    tx.append_history(&entry).await?;

    Ok((record, entry))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::models::Shift;
    use crate::store::MemoryStore;
    use crate::test_utils::pending_record;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn every_category_has_a_table_entry() {
        for c in Category::ALL {
            assert!(!required_fields(c).is_empty(), "{c} has no required fields");
        }
    }

    #[test]
    fn reports_each_missing_field() {
        let problems = missing_fields(Category::Operated, &map(json!({ "startTime": "09:00", "endTime": "  " })));
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.starts_with("endTime")));
    }

    #[test]
    fn note_description_needs_ten_chars() {
        let err = details_from_fields(
            Category::Note,
            map(json!({ "noteType": "Staff", "description": "too short", "impact": "LOW" })),
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");

        let ok = details_from_fields(
            Category::Note,
            map(json!({ "noteType": "Staff", "description": "ten chars!", "impact": "LOW" })),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn pending_never_arrives_flagged() {
        let details = details_from_fields(
            Category::Pending,
            map(json!({
                "priority": "SCHEDULABLE",
                "proposedProcedure": "Hernia repair",
                "anesthesiaType": "Spinal",
                "waitReason": "Awaiting labs",
                "carryForward": true
            })),
        )
        .unwrap();
        assert!(matches!(details, RecordDetails::Pending(p) if !p.carry_forward));
    }

    #[tokio::test]
    async fn change_rewrites_record_and_appends_history() {
        let store = MemoryStore::new();
        let shift = Shift::open(Utc::now(), vec![], vec![]);
        store.insert_shift(&shift).await.unwrap();
        let record = pending_record(&shift.id);
        store.insert_record(&record).await.unwrap();

        let change = CategoryChange {
            category: Category::Operated,
            fields: map(json!({
                "startTime": "11:00",
                "endTime": "12:15",
                "procedureType": "Appendectomy",
                "anesthesiaType": "General"
            })),
            note: Some("OR freed up".into()),
        };
        let (updated, entry) = change_category(&store, &record.id, change, "u2", "Dr. B")
            .await
            .unwrap();

        assert_eq!(updated.category(), Category::Operated);
        assert_eq!(entry.from_category, Category::Pending);
        assert_eq!(entry.to_category, Category::Operated);

        let stored = store.get_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.category(), Category::Operated);
        assert_eq!(history(&store, &record.id).await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn invalid_change_touches_nothing() {
        let store = MemoryStore::new();
        let shift = Shift::open(Utc::now(), vec![], vec![]);
        store.insert_shift(&shift).await.unwrap();
        let record = pending_record(&shift.id);
        store.insert_record(&record).await.unwrap();
        let before = store.dump().await;

        let same = CategoryChange {
            category: Category::Pending,
            fields: map(json!({
                "priority": "URGENT",
                "proposedProcedure": "x",
                "anesthesiaType": "y",
                "waitReason": "z"
            })),
            note: None,
        };
        let err = change_category(&store, &record.id, same, "u2", "Dr. B").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");

        let missing = CategoryChange {
            category: Category::NonSurgical,
            fields: map(json!({ "admissionReason": "Pain", "specialty": "GI", "estimatedStay": "1d" })),
            note: None,
        };
        let err = change_category(&store, "ghost", missing, "u2", "Dr. B").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        assert_eq!(store.dump().await, before);
        assert!(history(&store, &record.id).await.unwrap().is_empty());
        assert_eq!(history(&store, "ghost").await.unwrap_err().code(), "NOT_FOUND");
    }
}
