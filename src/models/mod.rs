// src/models/mod.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ───────────────────────────────────────
// Shifts
// ───────────────────────────────────────

/// One person working the shift, as printed on the closure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub name: String,
    pub clinical_role: String,
    pub hours: String, // free text, e.g. "08:00-20:00"
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub closed: bool,
    pub closed_by: Option<String>,
    pub closed_by_name: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub roster: Vec<Participant>,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
    pub report_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a shift. There is no way back to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftState {
    Open,
    ClosedNoReport,
    ClosedWithReport,
}

impl Shift {
    pub fn open(
        started_at: DateTime<Utc>,
        roster: Vec<Participant>,
        equipment: Vec<Equipment>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at,
            ended_at: None,
            closed: false,
            closed_by: None,
            closed_by_name: None,
            closed_at: None,
            roster,
            equipment,
            report_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> ShiftState {
        match (self.closed, &self.report_url) {
            (false, _) => ShiftState::Open,
            (true, None) => ShiftState::ClosedNoReport,
            (true, Some(_)) => ShiftState::ClosedWithReport,
        }
    }

    /// Apply closure metadata in memory. Stores persist the same fields in one write.
    pub fn apply_closure(&mut self, closure: &ShiftClosure) {
        self.closed = true;
        self.closed_by = Some(closure.closed_by.clone());
        self.closed_by_name = Some(closure.closed_by_name.clone());
        self.closed_at = Some(closure.closed_at);
        self.roster = closure.roster.clone();
        self.updated_at = closure.closed_at;
    }
}

/// Fields written onto a shift when it is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftClosure {
    pub closed_by: String,
    pub closed_by_name: String,
    pub closed_at: DateTime<Utc>,
    pub roster: Vec<Participant>,
}

// ───────────────────────────────────────
// Records
// ───────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Operated,
    Pending,
    NonSurgical,
    Note,
}

impl Category {
    /// Report and listing order.
    pub const ALL: [Category; 4] = [
        Category::Operated,
        Category::Pending,
        Category::NonSurgical,
        Category::Note,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Operated => "OPERATED",
            Category::Pending => "PENDING",
            Category::NonSurgical => "NON_SURGICAL",
            Category::Note => "NOTE",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Operated => "Operated",
            Category::Pending => "Pending",
            Category::NonSurgical => "Non-surgical",
            Category::Note => "Notes",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Urgent,
    Schedulable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatedDetails {
    pub start_time: String,
    pub end_time: String,
    pub procedure_type: String,
    pub anesthesia_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complications: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDetails {
    pub priority: Priority,
    pub proposed_procedure: String,
    pub anesthesia_type: String,
    pub wait_reason: String,
    #[serde(default)]
    pub carry_forward: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonSurgicalDetails {
    pub admission_reason: String,
    pub specialty: String,
    pub estimated_stay: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDetails {
    pub note_type: String,
    pub description: String, // ≥ 10 chars
    pub impact: Impact,
}

/// Category-specific fields. The serde tag is the record's category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordDetails {
    Operated(OperatedDetails),
    Pending(PendingDetails),
    NonSurgical(NonSurgicalDetails),
    Note(NoteDetails),
}

impl RecordDetails {
    pub fn category(&self) -> Category {
        match self {
            RecordDetails::Operated(_) => Category::Operated,
            RecordDetails::Pending(_) => Category::Pending,
            RecordDetails::NonSurgical(_) => Category::NonSurgical,
            RecordDetails::Note(_) => Category::Note,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub shift_id: String,
    pub patient_id: String,
    pub name: String,
    pub age: u8, // 0..=150
    pub national_id: String,
    pub responsible_surgeon: String,
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: RecordDetails,
}

impl Record {
    pub fn category(&self) -> Category {
        self.details.category()
    }

    pub fn is_carried_forward(&self) -> bool {
        matches!(&self.details, RecordDetails::Pending(p) if p.carry_forward)
    }
}

/// Patient and logistics fields shared by every category. Editing these never touches the
/// category, the details or the carry-forward flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBase {
    pub patient_id: String,
    pub name: String,
    pub age: u8,
    pub national_id: String,
    pub responsible_surgeon: String,
    pub room: String,
    pub notes: Option<String>,
}

impl Record {
    pub fn base(&self) -> RecordBase {
        RecordBase {
            patient_id: self.patient_id.clone(),
            name: self.name.clone(),
            age: self.age,
            national_id: self.national_id.clone(),
            responsible_surgeon: self.responsible_surgeon.clone(),
            room: self.room.clone(),
            notes: self.notes.clone(),
        }
    }

    pub fn apply_base(&mut self, base: RecordBase, at: DateTime<Utc>) {
        self.patient_id = base.patient_id;
        self.name = base.name;
        self.age = base.age;
        self.national_id = base.national_id;
        self.responsible_surgeon = base.responsible_surgeon;
        self.room = base.room;
        self.notes = base.notes;
        self.updated_at = at;
    }
}

// ───────────────────────────────────────
// Archive & audit trail
// ───────────────────────────────────────

/// Snapshot of a record taken when its shift was closed. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub id: String,
    pub shift_id: String,
    pub record: Record,
    pub closed_at: DateTime<Utc>,
    pub closed_by: String,
    pub closed_by_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeHistoryEntry {
    pub id: String,
    pub record_id: String,
    pub from_category: Category,
    pub to_category: Category,
    pub actor_id: String,
    pub actor_name: String,
    pub changed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ───────────────────────────────────────
// DTOs helpful for endpoints
// ───────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureResult {
    pub success: bool,
    pub archived_count: usize,
    pub carried_forward_count: usize,
    pub report_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_details_flatten_under_category_tag() {
        let json = serde_json::json!({
            "id": "r1",
            "shiftId": "s1",
            "patientId": "p1",
            "name": "Ana Perez",
            "age": 42,
            "nationalId": "12345678-5",
            "responsibleSurgeon": "Dr. Soto",
            "room": "B2",
            "createdBy": "u1",
            "createdAt": "2026-10-19T08:00:00Z",
            "updatedAt": "2026-10-19T08:00:00Z",
            "category": "PENDING",
            "priority": "URGENT",
            "proposedProcedure": "Appendectomy",
            "anesthesiaType": "General",
            "waitReason": "No OR available"
        });

        let record: Record = serde_json::from_value(json).unwrap();
        assert_eq!(record.category(), Category::Pending);
        assert!(!record.is_carried_forward());

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["category"], "PENDING");
        assert_eq!(back["carryForward"], false);
    }

    #[test]
    fn shift_state_follows_closure_and_report() {
        let mut shift = Shift::open(Utc::now(), vec![], vec![]);
        assert_eq!(shift.state(), ShiftState::Open);

        shift.apply_closure(&ShiftClosure {
            closed_by: "u1".into(),
            closed_by_name: "Dr. A".into(),
            closed_at: Utc::now(),
            roster: vec![],
        });
        assert_eq!(shift.state(), ShiftState::ClosedNoReport);

        shift.report_url = Some("http://localhost/reports/x.pdf".into());
        assert_eq!(shift.state(), ShiftState::ClosedWithReport);
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("non_surgical".parse::<Category>(), Ok(Category::NonSurgical));
        assert!("SURGERY".parse::<Category>().is_err());
    }
}
