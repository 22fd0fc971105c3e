// src/store/mod.rs

//! Durable state of the logbook: shifts, active records, the closure archive and the
//! category change history.
//!
//! Single-row CRUD goes straight through [`LogbookStore`]. Anything that must move several
//! entities together (closing a shift, changing a record's category) opens a [`StoreTx`] and
//! either commits all of its writes or none of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    ArchiveEntry, ChangeHistoryEntry, Equipment, Participant, Record, RecordBase, Shift,
    ShiftClosure,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another transaction committed a conflicting write first.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    /// A persisted row could not be decoded into a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Handle on one open transaction. Dropping it without `commit` discards every write.
#[async_trait]
pub trait StoreTx: Send {
    /// Read a shift and lock it against concurrent writers until the transaction ends.
    async fn shift_for_update(&mut self, id: &str) -> Result<Option<Shift>, StoreError>;

    async fn records_by_shift(&mut self, shift_id: &str) -> Result<Vec<Record>, StoreError>;

    async fn get_record(&mut self, id: &str) -> Result<Option<Record>, StoreError>;

    /// Flip the closed flag and write the closure fields. Fails if the shift is already closed.
    async fn close_shift(&mut self, id: &str, closure: &ShiftClosure) -> Result<(), StoreError>;

    async fn flag_carry_forward(
        &mut self,
        record_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn replace_record(&mut self, record: &Record) -> Result<(), StoreError>;

    async fn delete_record(&mut self, id: &str) -> Result<(), StoreError>;

    async fn append_archive(&mut self, entry: &ArchiveEntry) -> Result<(), StoreError>;

    async fn append_history(&mut self, entry: &ChangeHistoryEntry) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LogbookStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    // shifts
    async fn insert_shift(&self, shift: &Shift) -> Result<(), StoreError>;
    async fn get_shift(&self, id: &str) -> Result<Option<Shift>, StoreError>;
    /// Most recently started shift that is still open.
    async fn current_shift(&self) -> Result<Option<Shift>, StoreError>;
    async fn closed_shifts(&self, limit: i64) -> Result<Vec<Shift>, StoreError>;
    /// Returns `false` when the shift is missing or already closed.
    async fn update_roster(
        &self,
        id: &str,
        roster: &[Participant],
        equipment: &[Equipment],
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    /// Returns `false` when the shift is missing or not yet closed.
    async fn set_report_url(&self, id: &str, url: &str) -> Result<bool, StoreError>;

    // records
    /// Inserts only while the owning shift is open; returns `false` otherwise.
    async fn insert_record(&self, record: &Record) -> Result<bool, StoreError>;
    async fn get_record(&self, id: &str) -> Result<Option<Record>, StoreError>;
    async fn records_by_shift(&self, shift_id: &str) -> Result<Vec<Record>, StoreError>;
    /// Overwrite the base fields only and return the stored record, or `None` if it is gone.
    async fn update_record_base(
        &self,
        id: &str,
        base: &RecordBase,
        at: DateTime<Utc>,
    ) -> Result<Option<Record>, StoreError>;
    async fn delete_record(&self, id: &str) -> Result<bool, StoreError>;

    // archive + audit trail
    async fn archive_by_shift(&self, shift_id: &str) -> Result<Vec<ArchiveEntry>, StoreError>;
    async fn archive_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ArchiveEntry>, StoreError>;
    async fn history_for_record(
        &self,
        record_id: &str,
    ) -> Result<Vec<ChangeHistoryEntry>, StoreError>;
}
