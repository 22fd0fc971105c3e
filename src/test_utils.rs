// src/test_utils.rs

//! Record and roster builders shared by the unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    ArchiveEntry, ChangeHistoryEntry, Equipment, Impact, NonSurgicalDetails, NoteDetails,
    OperatedDetails, Participant, PendingDetails, Priority, Record, RecordBase, RecordDetails,
    Shift,
};
use crate::store::{LogbookStore, MemoryStore, StoreError, StoreTx};

pub fn roster() -> Vec<Participant> {
    vec![
        Participant {
            name: "Dr. A".into(),
            clinical_role: "Surgeon".into(),
            hours: "08:00-20:00".into(),
        },
        Participant {
            name: "Nurse B".into(),
            clinical_role: "Scrub nurse".into(),
            hours: "08:00-20:00".into(),
        },
    ]
}

pub fn record(shift_id: &str, details: RecordDetails) -> Record {
    let now = Utc::now();
    Record {
        id: uuid::Uuid::new_v4().to_string(),
        shift_id: shift_id.to_owned(),
        patient_id: "P-001".into(),
        name: "Ana Perez".into(),
        age: 42,
        national_id: "12345678-5".into(),
        responsible_surgeon: "Dr. Soto".into(),
        room: "B2".into(),
        notes: None,
        created_by: "u1".into(),
        created_at: now,
        updated_at: now,
        details,
    }
}

pub fn operated_record(shift_id: &str) -> Record {
    record(
        shift_id,
        RecordDetails::Operated(OperatedDetails {
            start_time: "09:00".into(),
            end_time: "10:30".into(),
            procedure_type: "Cholecystectomy".into(),
            anesthesia_type: "General".into(),
            complications: None,
        }),
    )
}

pub fn pending_record(shift_id: &str) -> Record {
    record(
        shift_id,
        RecordDetails::Pending(PendingDetails {
            priority: Priority::Urgent,
            proposed_procedure: "Appendectomy".into(),
            anesthesia_type: "General".into(),
            wait_reason: "No OR available".into(),
            carry_forward: false,
        }),
    )
}

pub fn non_surgical_record(shift_id: &str) -> Record {
    record(
        shift_id,
        RecordDetails::NonSurgical(NonSurgicalDetails {
            admission_reason: "Observation".into(),
            specialty: "Internal medicine".into(),
            estimated_stay: "2 days".into(),
        }),
    )
}

pub fn note_record(shift_id: &str) -> Record {
    record(
        shift_id,
        RecordDetails::Note(NoteDetails {
            note_type: "Equipment".into(),
            description: "Autoclave out of service since 14:00".into(),
            impact: Impact::Medium,
        }),
    )
}

type Hook = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Memory store that runs `hook` once, right before the first base-field write lands. Lets a
/// test slot another operation between a read and the write that follows it.
pub struct InterleavingStore {
    inner: MemoryStore,
    hook: Mutex<Option<Hook>>,
}

impl InterleavingStore {
    pub fn new<F, Fut>(inner: MemoryStore, hook: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: Hook = Box::new(move || Box::pin(hook()));
        Self {
            inner,
            hook: Mutex::new(Some(hook)),
        }
    }
}

#[async_trait]
impl LogbookStore for InterleavingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        self.inner.begin().await
    }

    async fn insert_shift(&self, shift: &Shift) -> Result<(), StoreError> {
        self.inner.insert_shift(shift).await
    }

    async fn get_shift(&self, id: &str) -> Result<Option<Shift>, StoreError> {
        self.inner.get_shift(id).await
    }

    async fn current_shift(&self) -> Result<Option<Shift>, StoreError> {
        self.inner.current_shift().await
    }

    async fn closed_shifts(&self, limit: i64) -> Result<Vec<Shift>, StoreError> {
        self.inner.closed_shifts(limit).await
    }

    async fn update_roster(
        &self,
        id: &str,
        roster: &[Participant],
        equipment: &[Equipment],
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.update_roster(id, roster, equipment, at).await
    }

    async fn set_report_url(&self, id: &str, url: &str) -> Result<bool, StoreError> {
        self.inner.set_report_url(id, url).await
    }

    async fn insert_record(&self, record: &Record) -> Result<bool, StoreError> {
        self.inner.insert_record(record).await
    }

    async fn get_record(&self, id: &str) -> Result<Option<Record>, StoreError> {
        self.inner.get_record(id).await
    }

    async fn records_by_shift(&self, shift_id: &str) -> Result<Vec<Record>, StoreError> {
        self.inner.records_by_shift(shift_id).await
    }

    async fn update_record_base(
        &self,
        id: &str,
        base: &RecordBase,
        at: DateTime<Utc>,
    ) -> Result<Option<Record>, StoreError> {
        let hook = self.hook.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hook) = hook {
            hook().await;
        }
        self.inner.update_record_base(id, base, at).await
    }

    async fn delete_record(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_record(id).await
    }

    async fn archive_by_shift(&self, shift_id: &str) -> Result<Vec<ArchiveEntry>, StoreError> {
        self.inner.archive_by_shift(shift_id).await
    }

    async fn archive_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ArchiveEntry>, StoreError> {
        self.inner.archive_between(from, to).await
    }

    async fn history_for_record(
        &self,
        record_id: &str,
    ) -> Result<Vec<ChangeHistoryEntry>, StoreError> {
        self.inner.history_for_record(record_id).await
    }
}
