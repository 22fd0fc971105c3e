// src/store/memory.rs

//! In-process store with snapshot isolation.
//!
//! Every transaction works on a private copy of the tables taken at `begin`. On commit the
//! keys it read or wrote are checked against the commit sequence: if any of them was written
//! by a transaction (or a direct write) that committed after the snapshot, the commit fails
//! with [`StoreError::Conflict`] and nothing is applied. First committer wins.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::{LogbookStore, StoreError, StoreTx};
use crate::models::{
    ArchiveEntry, ChangeHistoryEntry, Equipment, Participant, Record, RecordBase, RecordDetails,
    Shift, ShiftClosure,
};

/// Full contents of the store, comparable for before/after snapshot diffs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub shifts: BTreeMap<String, Shift>,
    pub records: BTreeMap<String, Record>,
    pub archive: BTreeMap<String, ArchiveEntry>,
    pub history: BTreeMap<String, ChangeHistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Key {
    Shift(String),
    Record(String),
    /// Membership of a shift's record set; bumped on insert and delete.
    ShiftRecords(String),
    Archive(String),
    History(String),
}

#[derive(Default)]
struct Inner {
    tables: Tables,
    versions: HashMap<Key, u64>,
    commit_seq: u64,
    fail_next_commit: bool,
}

impl Inner {
    fn bump<I: IntoIterator<Item = Key>>(&mut self, keys: I) {
        self.commit_seq += 1;
        for key in keys {
            self.versions.insert(key, self.commit_seq);
        }
    }

    fn changed_since(&self, key: &Key, seq: u64) -> bool {
        self.versions.get(key).is_some_and(|v| *v > seq)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every table, for assertions.
    pub async fn dump(&self) -> Tables {
        self.inner.lock().await.tables.clone()
    }

    /// Make the next commit abort as if the backend rejected it.
    pub async fn fail_next_commit(&self) {
        self.inner.lock().await.fail_next_commit = true;
    }
}

fn sorted_records<'a, I: Iterator<Item = &'a Record>>(records: I) -> Vec<Record> {
    let mut out: Vec<Record> = records.cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    out
}

pub struct MemoryTx {
    inner: Arc<Mutex<Inner>>,
    snapshot_seq: u64,
    working: Tables,
    reads: BTreeSet<Key>,
    writes: BTreeSet<Key>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn shift_for_update(&mut self, id: &str) -> Result<Option<Shift>, StoreError> {
        self.reads.insert(Key::Shift(id.to_owned()));
        Ok(self.working.shifts.get(id).cloned())
    }

    async fn records_by_shift(&mut self, shift_id: &str) -> Result<Vec<Record>, StoreError> {
        self.reads.insert(Key::ShiftRecords(shift_id.to_owned()));
        let records = sorted_records(
            self.working
                .records
                .values()
                .filter(|r| r.shift_id == shift_id),
        );
        for r in &records {
            self.reads.insert(Key::Record(r.id.clone()));
        }
        Ok(records)
    }

    async fn get_record(&mut self, id: &str) -> Result<Option<Record>, StoreError> {
        self.reads.insert(Key::Record(id.to_owned()));
        Ok(self.working.records.get(id).cloned())
    }

    async fn close_shift(&mut self, id: &str, closure: &ShiftClosure) -> Result<(), StoreError> {
        let shift = self
            .working
            .shifts
            .get_mut(id)
            .ok_or_else(|| StoreError::Backend(format!("shift {id} vanished")))?;
        if shift.closed {
            return Err(StoreError::Conflict(format!("shift {id} already closed")));
        }
        shift.apply_closure(closure);
        self.writes.insert(Key::Shift(id.to_owned()));
        Ok(())
    }

    async fn flag_carry_forward(
        &mut self,
        record_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let record = self
            .working
            .records
            .get_mut(record_id)
            .ok_or_else(|| StoreError::Backend(format!("record {record_id} vanished")))?;
        match &mut record.details {
            RecordDetails::Pending(p) => p.carry_forward = true,
            _ => {
                return Err(StoreError::Backend(format!(
                    "record {record_id} is not PENDING"
                )))
            }
        }
        record.updated_at = at;
        self.writes.insert(Key::Record(record_id.to_owned()));
        Ok(())
    }

    async fn replace_record(&mut self, record: &Record) -> Result<(), StoreError> {
        if !self.working.records.contains_key(&record.id) {
            return Err(StoreError::Backend(format!("record {} vanished", record.id)));
        }
        self.working.records.insert(record.id.clone(), record.clone());
        self.writes.insert(Key::Record(record.id.clone()));
        Ok(())
    }

    async fn delete_record(&mut self, id: &str) -> Result<(), StoreError> {
        let removed = self
            .working
            .records
            .remove(id)
            .ok_or_else(|| StoreError::Backend(format!("record {id} vanished")))?;
        self.writes.insert(Key::Record(id.to_owned()));
        self.writes.insert(Key::ShiftRecords(removed.shift_id));
        Ok(())
    }

    async fn append_archive(&mut self, entry: &ArchiveEntry) -> Result<(), StoreError> {
        if self.working.archive.contains_key(&entry.id) {
            return Err(StoreError::Backend(format!("duplicate archive id {}", entry.id)));
        }
        self.working.archive.insert(entry.id.clone(), entry.clone());
        self.writes.insert(Key::Archive(entry.id.clone()));
        Ok(())
    }

    async fn append_history(&mut self, entry: &ChangeHistoryEntry) -> Result<(), StoreError> {
        self.working.history.insert(entry.id.clone(), entry.clone());
        self.writes.insert(Key::History(entry.id.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { inner, snapshot_seq, mut working, reads, writes } = *self;
        let mut inner = inner.lock().await;

        if inner.fail_next_commit {
            inner.fail_next_commit = false;
            return Err(StoreError::Backend("injected commit failure".into()));
        }

        if let Some(key) = reads
            .iter()
            .chain(writes.iter())
            .find(|k| inner.changed_since(k, snapshot_seq))
        {
            debug!(?key, snapshot_seq, "memory transaction lost a write race");
            return Err(StoreError::Conflict(format!("{key:?} changed concurrently")));
        }

        for key in &writes {
            let tables = &mut inner.tables;
            match key {
                Key::Shift(id) => copy_entry(&mut working.shifts, &mut tables.shifts, id),
                Key::Record(id) => copy_entry(&mut working.records, &mut tables.records, id),
                Key::Archive(id) => copy_entry(&mut working.archive, &mut tables.archive, id),
                Key::History(id) => copy_entry(&mut working.history, &mut tables.history, id),
                Key::ShiftRecords(_) => {}
            }
        }
        inner.bump(writes);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

fn copy_entry<T>(from: &mut BTreeMap<String, T>, to: &mut BTreeMap<String, T>, id: &str) {
    match from.remove(id) {
        Some(value) => {
            to.insert(id.to_owned(), value);
        }
        None => {
            to.remove(id);
        }
    }
}

#[async_trait]
impl LogbookStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            snapshot_seq: inner.commit_seq,
            working: inner.tables.clone(),
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
        }))
    }

    async fn insert_shift(&self, shift: &Shift) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.tables.shifts.contains_key(&shift.id) {
            return Err(StoreError::Backend(format!("duplicate shift id {}", shift.id)));
        }
        inner.tables.shifts.insert(shift.id.clone(), shift.clone());
        inner.bump([Key::Shift(shift.id.clone())]);
        Ok(())
    }

    async fn get_shift(&self, id: &str) -> Result<Option<Shift>, StoreError> {
        Ok(self.inner.lock().await.tables.shifts.get(id).cloned())
    }

    async fn current_shift(&self) -> Result<Option<Shift>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tables
            .shifts
            .values()
            .filter(|s| !s.closed)
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn closed_shifts(&self, limit: i64) -> Result<Vec<Shift>, StoreError> {
        let inner = self.inner.lock().await;
        let mut shifts: Vec<Shift> =
            inner.tables.shifts.values().filter(|s| s.closed).cloned().collect();
        shifts.sort_by(|a, b| b.closed_at.cmp(&a.closed_at));
        shifts.truncate(limit.max(0) as usize);
        Ok(shifts)
    }

    async fn update_roster(
        &self,
        id: &str,
        roster: &[Participant],
        equipment: &[Equipment],
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.tables.shifts.get_mut(id) {
            Some(shift) if !shift.closed => {
                shift.roster = roster.to_vec();
                shift.equipment = equipment.to_vec();
                shift.updated_at = at;
            }
            _ => return Ok(false),
        }
        inner.bump([Key::Shift(id.to_owned())]);
        Ok(true)
    }

    async fn set_report_url(&self, id: &str, url: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.tables.shifts.get_mut(id) {
            Some(shift) if shift.closed => shift.report_url = Some(url.to_owned()),
            _ => return Ok(false),
        }
        inner.bump([Key::Shift(id.to_owned())]);
        Ok(true)
    }

    async fn insert_record(&self, record: &Record) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let open = inner
            .tables
            .shifts
            .get(&record.shift_id)
            .is_some_and(|s| !s.closed);
        if !open {
            return Ok(false);
        }
        if inner.tables.records.contains_key(&record.id) {
            return Err(StoreError::Backend(format!("duplicate record id {}", record.id)));
        }
        inner.tables.records.insert(record.id.clone(), record.clone());
        inner.bump([
            Key::Record(record.id.clone()),
            Key::ShiftRecords(record.shift_id.clone()),
        ]);
        Ok(true)
    }

    async fn get_record(&self, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.inner.lock().await.tables.records.get(id).cloned())
    }

    async fn records_by_shift(&self, shift_id: &str) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(sorted_records(
            inner.tables.records.values().filter(|r| r.shift_id == shift_id),
        ))
    }

    async fn update_record_base(
        &self,
        id: &str,
        base: &RecordBase,
        at: DateTime<Utc>,
    ) -> Result<Option<Record>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.tables.records.get_mut(id) else {
            return Ok(None);
        };
        record.apply_base(base.clone(), at);
        let updated = record.clone();
        inner.bump([Key::Record(id.to_owned())]);
        Ok(Some(updated))
    }

    async fn delete_record(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(removed) = inner.tables.records.remove(id) else {
            return Ok(false);
        };
        inner.bump([Key::Record(id.to_owned()), Key::ShiftRecords(removed.shift_id)]);
        Ok(true)
    }

    async fn archive_by_shift(&self, shift_id: &str) -> Result<Vec<ArchiveEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<ArchiveEntry> = inner
            .tables
            .archive
            .values()
            .filter(|e| e.shift_id == shift_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.record.created_at.cmp(&b.record.created_at));
        Ok(entries)
    }

    async fn archive_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ArchiveEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<ArchiveEntry> = inner
            .tables
            .archive
            .values()
            .filter(|e| e.closed_at >= from && e.closed_at <= to)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.closed_at
                .cmp(&a.closed_at)
                .then_with(|| a.record.created_at.cmp(&b.record.created_at))
        });
        Ok(entries)
    }

    async fn history_for_record(
        &self,
        record_id: &str,
    ) -> Result<Vec<ChangeHistoryEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<ChangeHistoryEntry> = inner
            .tables
            .history
            .values()
            .filter(|h| h.record_id == record_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.changed_at.cmp(&a.changed_at));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::test_utils::{operated_record, pending_record};

    struct Seeded {
        store: MemoryStore,
        shift: Shift,
    }

    #[fixture]
    async fn seeded() -> Seeded {
        let store = MemoryStore::new();
        let shift = Shift::open(Utc::now(), vec![], vec![]);
        store.insert_shift(&shift).await.unwrap();
        store.insert_record(&operated_record(&shift.id)).await.unwrap();
        store.insert_record(&pending_record(&shift.id)).await.unwrap();
        Seeded { store, shift }
    }

    fn closure() -> ShiftClosure {
        ShiftClosure {
            closed_by: "u1".into(),
            closed_by_name: "Dr. A".into(),
            closed_at: Utc::now(),
            roster: vec![],
        }
    }

    #[rstest]
    #[tokio::test]
    async fn second_committer_on_same_shift_conflicts(#[future] seeded: Seeded) {
        let Seeded { store, shift } = seeded.await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.shift_for_update(&shift.id).await.unwrap();
        second.shift_for_update(&shift.id).await.unwrap();
        first.close_shift(&shift.id, &closure()).await.unwrap();
        second.close_shift(&shift.id, &closure()).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_shift(&shift.id).await.unwrap().unwrap().closed);
    }

    #[rstest]
    #[tokio::test]
    async fn record_inserted_after_snapshot_invalidates_read(#[future] seeded: Seeded) {
        let Seeded { store, shift } = seeded.await;

        let mut tx = store.begin().await.unwrap();
        let seen = tx.records_by_shift(&shift.id).await.unwrap();
        assert_eq!(seen.len(), 2);

        store.insert_record(&operated_record(&shift.id)).await.unwrap();

        tx.close_shift(&shift.id, &closure()).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
        assert!(!store.get_shift(&shift.id).await.unwrap().unwrap().closed);
    }

    #[rstest]
    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace(#[future] seeded: Seeded) {
        let Seeded { store, shift } = seeded.await;
        let before = store.dump().await;

        let mut tx = store.begin().await.unwrap();
        for record in tx.records_by_shift(&shift.id).await.unwrap() {
            tx.delete_record(&record.id).await.unwrap();
        }
        drop(tx);

        assert_eq!(store.dump().await, before);
    }

    #[rstest]
    #[tokio::test]
    async fn injected_failure_discards_writes(#[future] seeded: Seeded) {
        let Seeded { store, shift } = seeded.await;
        let before = store.dump().await;
        store.fail_next_commit().await;

        let mut tx = store.begin().await.unwrap();
        tx.close_shift(&shift.id, &closure()).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert_eq!(store.dump().await, before);
    }

    #[rstest]
    #[tokio::test]
    async fn records_cannot_join_a_closed_shift(#[future] seeded: Seeded) {
        let Seeded { store, shift } = seeded.await;

        let mut tx = store.begin().await.unwrap();
        tx.close_shift(&shift.id, &closure()).await.unwrap();
        tx.commit().await.unwrap();

        let inserted = store.insert_record(&pending_record(&shift.id)).await.unwrap();
        assert!(!inserted);
        assert!(!store.update_roster(&shift.id, &[], &[], Utc::now()).await.unwrap());
    }
}
