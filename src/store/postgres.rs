// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{query, query_as, FromRow, PgPool, Postgres, Transaction};

use super::{LogbookStore, StoreError, StoreTx};
use crate::models::{
    ArchiveEntry, Category, ChangeHistoryEntry, Equipment, Participant, Record, RecordBase,
    RecordDetails, Shift, ShiftClosure,
};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // serialization_failure / deadlock_detected
        let code = e
            .as_database_error()
            .and_then(|d| d.code())
            .map(|c| c.into_owned());
        match code.as_deref() {
            Some("40001") | Some("40P01") => StoreError::Conflict(e.to_string()),
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct ShiftRow {
    id: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    closed: bool,
    closed_by: Option<String>,
    closed_by_name: Option<String>,
    closed_at: Option<DateTime<Utc>>,
    roster: Json<Vec<Participant>>,   // jsonb
    equipment: Json<Vec<Equipment>>,  // jsonb
    report_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ShiftRow> for Shift {
    fn from(r: ShiftRow) -> Self {
        Shift {
            id: r.id,
            started_at: r.started_at,
            ended_at: r.ended_at,
            closed: r.closed,
            closed_by: r.closed_by,
            closed_by_name: r.closed_by_name,
            closed_at: r.closed_at,
            roster: r.roster.0,
            equipment: r.equipment.0,
            report_url: r.report_url,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(FromRow)]
struct RecordRow {
    id: String,
    shift_id: String,
    patient_id: String,
    name: String,
    age: i16,
    national_id: String,
    responsible_surgeon: String,
    room: String,
    notes: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    details: Json<RecordDetails>, // jsonb, tagged by category
}

impl TryFrom<RecordRow> for Record {
    type Error = StoreError;

    fn try_from(r: RecordRow) -> Result<Self, Self::Error> {
        let age = u8::try_from(r.age)
            .map_err(|_| StoreError::Corrupt(format!("record {} has age {}", r.id, r.age)))?;
        Ok(Record {
            id: r.id,
            shift_id: r.shift_id,
            patient_id: r.patient_id,
            name: r.name,
            age,
            national_id: r.national_id,
            responsible_surgeon: r.responsible_surgeon,
            room: r.room,
            notes: r.notes,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
            details: r.details.0,
        })
    }
}

fn records_from_rows(rows: Vec<RecordRow>) -> Result<Vec<Record>, StoreError> {
    rows.into_iter().map(Record::try_from).collect()
}

#[derive(FromRow)]
struct ArchiveRow {
    id: String,
    shift_id: String,
    record: Json<Record>, // jsonb snapshot
    closed_at: DateTime<Utc>,
    closed_by: String,
    closed_by_name: String,
}

impl From<ArchiveRow> for ArchiveEntry {
    fn from(r: ArchiveRow) -> Self {
        ArchiveEntry {
            id: r.id,
            shift_id: r.shift_id,
            record: r.record.0,
            closed_at: r.closed_at,
            closed_by: r.closed_by,
            closed_by_name: r.closed_by_name,
        }
    }
}

#[derive(FromRow)]
struct HistoryRow {
    id: String,
    record_id: String,
    from_category: String,
    to_category: String,
    actor_id: String,
    actor_name: String,
    changed_at: DateTime<Utc>,
    note: Option<String>,
}

impl TryFrom<HistoryRow> for ChangeHistoryEntry {
    type Error = StoreError;

    fn try_from(r: HistoryRow) -> Result<Self, Self::Error> {
        let parse = |s: &str| s.parse::<Category>().map_err(StoreError::Corrupt);
        Ok(ChangeHistoryEntry {
            from_category: parse(&r.from_category)?,
            to_category: parse(&r.to_category)?,
            id: r.id,
            record_id: r.record_id,
            actor_id: r.actor_id,
            actor_name: r.actor_name,
            changed_at: r.changed_at,
            note: r.note,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction
// ─────────────────────────────────────────────────────────────────────────────

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn shift_for_update(&mut self, id: &str) -> Result<Option<Shift>, StoreError> {
        let row = query_as::<_, ShiftRow>(r#"SELECT * FROM shifts WHERE id = $1 FOR UPDATE"#)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Shift::from))
    }

    async fn records_by_shift(&mut self, shift_id: &str) -> Result<Vec<Record>, StoreError> {
        let rows = query_as::<_, RecordRow>(
            r#"SELECT * FROM records WHERE shift_id = $1 ORDER BY created_at, id FOR UPDATE"#,
        )
        .bind(shift_id)
        .fetch_all(&mut *self.tx)
        .await?;
        records_from_rows(rows)
    }

    async fn get_record(&mut self, id: &str) -> Result<Option<Record>, StoreError> {
        let row = query_as::<_, RecordRow>(r#"SELECT * FROM records WHERE id = $1 FOR UPDATE"#)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Record::try_from).transpose()
    }

    async fn close_shift(&mut self, id: &str, closure: &ShiftClosure) -> Result<(), StoreError> {
        let res = query(
            r#"
            UPDATE shifts
               SET closed = TRUE,
                   closed_by = $2,
                   closed_by_name = $3,
                   closed_at = $4,
                   roster = $5,
                   updated_at = $4
             WHERE id = $1 AND closed = FALSE
            "#,
        )
        .bind(id)
        .bind(&closure.closed_by)
        .bind(&closure.closed_by_name)
        .bind(closure.closed_at)
        .bind(Json(&closure.roster))
        .execute(&mut *self.tx)
        .await?;

        if res.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!("shift {id} already closed")));
        }
        Ok(())
    }

    async fn flag_carry_forward(
        &mut self,
        record_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let res = query(
            r#"
            UPDATE records
               SET details = jsonb_set(details, '{carryForward}', 'true'::jsonb),
                   updated_at = $2
             WHERE id = $1 AND category = 'PENDING'
            "#,
        )
        .bind(record_id)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        if res.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!("record {record_id} changed under closure")));
        }
        Ok(())
    }

    async fn replace_record(&mut self, record: &Record) -> Result<(), StoreError> {
        let res = update_record_query(record).execute(&mut *self.tx).await?;
        if res.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!("record {} vanished", record.id)));
        }
        Ok(())
    }

    async fn delete_record(&mut self, id: &str) -> Result<(), StoreError> {
        let res = query(r#"DELETE FROM records WHERE id = $1"#)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if res.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!("record {id} vanished")));
        }
        Ok(())
    }

    async fn append_archive(&mut self, entry: &ArchiveEntry) -> Result<(), StoreError> {
        query(
            r#"
            INSERT INTO archive_entries
                (id, shift_id, record, closed_at, closed_by, closed_by_name)
            VALUES ($1,$2,$3,$4,$5,$6)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.shift_id)
        .bind(Json(&entry.record))
        .bind(entry.closed_at)
        .bind(&entry.closed_by)
        .bind(&entry.closed_by_name)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_history(&mut self, entry: &ChangeHistoryEntry) -> Result<(), StoreError> {
        query(
            r#"
            INSERT INTO change_history
                (id, record_id, from_category, to_category, actor_id, actor_name, changed_at, note)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.record_id)
        .bind(entry.from_category.as_str())
        .bind(entry.to_category.as_str())
        .bind(&entry.actor_id)
        .bind(&entry.actor_name)
        .bind(entry.changed_at)
        .bind(&entry.note)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn update_record_query(
    record: &Record,
) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    query(
        r#"
        UPDATE records SET
          category            = $2,
          patient_id          = $3,
          name                = $4,
          age                 = $5,
          national_id         = $6,
          responsible_surgeon = $7,
          room                = $8,
          notes               = $9,
          details             = $10,
          updated_at          = $11
        WHERE id = $1
        "#,
    )
    .bind(&record.id)
    .bind(record.category().as_str())
    .bind(&record.patient_id)
    .bind(&record.name)
    .bind(i16::from(record.age))
    .bind(&record.national_id)
    .bind(&record.responsible_surgeon)
    .bind(&record.room)
    .bind(&record.notes)
    .bind(Json(&record.details))
    .bind(record.updated_at)
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogbookStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self.pool.begin().await?;
        query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn insert_shift(&self, shift: &Shift) -> Result<(), StoreError> {
        query(
            r#"
            INSERT INTO shifts
              (id, started_at, ended_at, closed, closed_by, closed_by_name, closed_at,
               roster, equipment, report_url, created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
            "#,
        )
        .bind(&shift.id)
        .bind(shift.started_at)
        .bind(shift.ended_at)
        .bind(shift.closed)
        .bind(&shift.closed_by)
        .bind(&shift.closed_by_name)
        .bind(shift.closed_at)
        .bind(Json(&shift.roster))
        .bind(Json(&shift.equipment))
        .bind(&shift.report_url)
        .bind(shift.created_at)
        .bind(shift.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_shift(&self, id: &str) -> Result<Option<Shift>, StoreError> {
        let row = query_as::<_, ShiftRow>(r#"SELECT * FROM shifts WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Shift::from))
    }

    async fn current_shift(&self) -> Result<Option<Shift>, StoreError> {
        let row = query_as::<_, ShiftRow>(
            r#"SELECT * FROM shifts WHERE closed = FALSE ORDER BY started_at DESC LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Shift::from))
    }

    async fn closed_shifts(&self, limit: i64) -> Result<Vec<Shift>, StoreError> {
        let rows = query_as::<_, ShiftRow>(
            r#"SELECT * FROM shifts WHERE closed = TRUE ORDER BY closed_at DESC LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Shift::from).collect())
    }

    async fn update_roster(
        &self,
        id: &str,
        roster: &[Participant],
        equipment: &[Equipment],
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let res = query(
            r#"
            UPDATE shifts SET roster = $2, equipment = $3, updated_at = $4
             WHERE id = $1 AND closed = FALSE
            "#,
        )
        .bind(id)
        .bind(Json(roster))
        .bind(Json(equipment))
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_report_url(&self, id: &str, url: &str) -> Result<bool, StoreError> {
        let res = query(r#"UPDATE shifts SET report_url = $2 WHERE id = $1 AND closed = TRUE"#)
            .bind(id)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_record(&self, record: &Record) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Writing the shift row makes a concurrent closure either wait for us (and then see
        // the new record) or fail its serializable commit. Once the shift is closed this
        // matches nothing.
        let open = query(r#"UPDATE shifts SET updated_at = updated_at WHERE id = $1 AND closed = FALSE"#)
            .bind(&record.shift_id)
            .execute(&mut *tx)
            .await?;
        if open.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        query(
            r#"
            INSERT INTO records
              (id, shift_id, category, patient_id, name, age, national_id,
               responsible_surgeon, room, notes, created_by, created_at, updated_at, details)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
            "#,
        )
        .bind(&record.id)
        .bind(&record.shift_id)
        .bind(record.category().as_str())
        .bind(&record.patient_id)
        .bind(&record.name)
        .bind(i16::from(record.age))
        .bind(&record.national_id)
        .bind(&record.responsible_surgeon)
        .bind(&record.room)
        .bind(&record.notes)
        .bind(&record.created_by)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(Json(&record.details))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn get_record(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let row = query_as::<_, RecordRow>(r#"SELECT * FROM records WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Record::try_from).transpose()
    }

    async fn records_by_shift(&self, shift_id: &str) -> Result<Vec<Record>, StoreError> {
        let rows = query_as::<_, RecordRow>(
            r#"SELECT * FROM records WHERE shift_id = $1 ORDER BY created_at, id"#,
        )
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;
        records_from_rows(rows)
    }

    async fn update_record_base(
        &self,
        id: &str,
        base: &RecordBase,
        at: DateTime<Utc>,
    ) -> Result<Option<Record>, StoreError> {
        // category and details are only written by closure and category change
        let row = query_as::<_, RecordRow>(
            r#"
            UPDATE records SET
              patient_id          = $2,
              name                = $3,
              age                 = $4,
              national_id         = $5,
              responsible_surgeon = $6,
              room                = $7,
              notes               = $8,
              updated_at          = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&base.patient_id)
        .bind(&base.name)
        .bind(i16::from(base.age))
        .bind(&base.national_id)
        .bind(&base.responsible_surgeon)
        .bind(&base.room)
        .bind(&base.notes)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Record::try_from).transpose()
    }

    async fn delete_record(&self, id: &str) -> Result<bool, StoreError> {
        let res = query(r#"DELETE FROM records WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn archive_by_shift(&self, shift_id: &str) -> Result<Vec<ArchiveEntry>, StoreError> {
        let rows = query_as::<_, ArchiveRow>(
            r#"
            SELECT * FROM archive_entries
             WHERE shift_id = $1
             ORDER BY (record->>'createdAt')::timestamptz, id
            "#,
        )
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ArchiveEntry::from).collect())
    }

    async fn archive_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ArchiveEntry>, StoreError> {
        let rows = query_as::<_, ArchiveRow>(
            r#"
            SELECT * FROM archive_entries
             WHERE closed_at BETWEEN $1 AND $2
             ORDER BY closed_at DESC, (record->>'createdAt')::timestamptz, id
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ArchiveEntry::from).collect())
    }

    async fn history_for_record(
        &self,
        record_id: &str,
    ) -> Result<Vec<ChangeHistoryEntry>, StoreError> {
        let rows = query_as::<_, HistoryRow>(
            r#"SELECT * FROM change_history WHERE record_id = $1 ORDER BY changed_at DESC"#,
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ChangeHistoryEntry::try_from).collect()
    }
}
