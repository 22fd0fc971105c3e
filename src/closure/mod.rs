// src/closure/mod.rs

//! Shift closure.
//!
//! Phase 1 runs in one store transaction: check the shift is open, read its records, flag
//! PENDING records for carry-forward, archive and delete everything else, mark the shift
//! closed. It commits entirely or not at all.
//!
//! Phase 2 runs after commit and is best effort: render the report from the records read in
//! phase 1, store the document, write its URL onto the shift. A failure here leaves the shift
//! closed without a report; [`ShiftClosureCoordinator::backfill_report`] retries it.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::documents::{DocumentError, DocumentMetadata, DocumentStore};
use crate::error::LogbookError;
use crate::models::{
    ArchiveEntry, Category, ClosureResult, Participant, Record, ShiftClosure,
};
use crate::report::{ReportBundle, ReportError, ReportGenerator};
use crate::store::{LogbookStore, StoreError, StoreTx};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseShiftInput {
    pub shift_id: String,
    pub roster: Vec<Participant>,
    pub actor_id: String,
    pub actor_name: String,
}

impl CloseShiftInput {
    fn validate(&self) -> Result<(), LogbookError> {
        let mut problems = Vec::new();
        if self.shift_id.trim().is_empty() {
            problems.push("shiftId is required".to_owned());
        }
        if self.actor_id.trim().is_empty() {
            problems.push("actorId is required".to_owned());
        }
        if self.actor_name.trim().is_empty() {
            problems.push("actorName is required".to_owned());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(LogbookError::Validation(problems))
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum PublishError {
    #[error(transparent)]
    Render(#[from] ReportError),
    #[error("report renderer crashed: {0}")]
    Crashed(String),
    #[error(transparent)]
    Upload(#[from] DocumentError),
    #[error("could not record report url: {0}")]
    Store(#[from] StoreError),
    #[error("shift {0} is not closed")]
    NotClosed(String),
}

/// Outcome of a committed phase 1.
struct Committed {
    archived: usize,
    carried_forward: usize,
    bundle: ReportBundle,
}

#[derive(Clone)]
pub struct ShiftClosureCoordinator {
    store: Arc<dyn LogbookStore>,
    reports: Arc<dyn ReportGenerator>,
    documents: Arc<dyn DocumentStore>,
}

impl ShiftClosureCoordinator {
    pub fn new(
        store: Arc<dyn LogbookStore>,
        reports: Arc<dyn ReportGenerator>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self { store, reports, documents }
    }

    /// Close a shift exactly once. See the module docs for the two phases.
    ///
    /// Returns `ReportGenerationFailed` (carrying the counts) when the data was closed but
    /// the report could not be produced; do not call this again in that case, use
    /// [`Self::backfill_report`].
    #[instrument(skip_all, fields(shift_id = %input.shift_id, actor_id = %input.actor_id))]
    pub async fn close_shift(&self, input: CloseShiftInput) -> Result<ClosureResult, LogbookError> {
        input.validate()?;

        let committed = self.commit_closure(input).await?;
        let Committed { archived, carried_forward, bundle } = committed;
        let shift_id = bundle.shift.id.clone();
        info!(archived, carried_forward, "shift closed");

        match self.publish_report(bundle).await {
            Ok(url) => Ok(ClosureResult {
                success: true,
                archived_count: archived,
                carried_forward_count: carried_forward,
                report_url: Some(url),
            }),
            Err(e) => {
                warn!(error = %e, "shift closed without report");
                Err(LogbookError::ReportGenerationFailed {
                    shift_id,
                    archived_count: archived,
                    carried_forward_count: carried_forward,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Re-run phase 2 for a closed shift. Returns the existing URL if there already is one.
    #[instrument(skip(self))]
    pub async fn backfill_report(&self, shift_id: &str) -> Result<ClosureResult, LogbookError> {
        let shift = self
            .store
            .get_shift(shift_id)
            .await?
            .ok_or_else(|| LogbookError::shift_not_found(shift_id))?;
        if !shift.closed {
            return Err(LogbookError::invalid(format!("shift '{shift_id}' is still open")));
        }

        let archived = self.store.archive_by_shift(shift_id).await?;
        let carried: Vec<Record> = self
            .store
            .records_by_shift(shift_id)
            .await?
            .into_iter()
            .filter(Record::is_carried_forward)
            .collect();
        let archived_count = archived.len();
        let carried_forward_count = carried.len();

        if let Some(url) = &shift.report_url {
            return Ok(ClosureResult {
                success: true,
                archived_count,
                carried_forward_count,
                report_url: Some(url.clone()),
            });
        }

        let mut records: Vec<Record> =
            archived.into_iter().map(|e| e.record).chain(carried).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let bundle = ReportBundle {
            roster: shift.roster.clone(),
            closed_by_name: shift.closed_by_name.clone().unwrap_or_default(),
            closed_at: shift.closed_at.unwrap_or(shift.updated_at),
            records,
            shift,
        };

        match self.publish_report(bundle).await {
            Ok(url) => {
                info!(%url, "report backfilled");
                Ok(ClosureResult {
                    success: true,
                    archived_count,
                    carried_forward_count,
                    report_url: Some(url),
                })
            }
            Err(e) => Err(LogbookError::ReportGenerationFailed {
                shift_id: shift_id.to_owned(),
                archived_count,
                carried_forward_count,
                reason: e.to_string(),
            }),
        }
    }

    async fn commit_closure(&self, input: CloseShiftInput) -> Result<Committed, LogbookError> {
        let mut tx = self.store.begin().await?;
        match close_in_tx(tx.as_mut(), input).await {
            Ok(committed) => {
                tx.commit().await?;
                Ok(committed)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "rollback after failed closure");
                }
                Err(e)
            }
        }
    }

    async fn publish_report(&self, bundle: ReportBundle) -> Result<String, PublishError> {
        let meta = DocumentMetadata {
            shift_id: bundle.shift.id.clone(),
            closed_by: bundle.shift.closed_by.clone().unwrap_or_default(),
            closed_at: bundle.closed_at,
            content_type: self.reports.content_type(),
            extension: self.reports.file_extension(),
        };

        let reports = Arc::clone(&self.reports);
        let bytes = tokio::task::spawn_blocking(move || reports.render(&bundle))
            .await
            .map_err(|e| PublishError::Crashed(e.to_string()))??;

        let url = self.documents.save(bytes, &meta).await?;
        if !self.store.set_report_url(&meta.shift_id, &url).await? {
            return Err(PublishError::NotClosed(meta.shift_id));
        }
        Ok(url)
    }
}

/// Phase 1 body. Every read and write goes through `tx`.
async fn close_in_tx(
    tx: &mut dyn StoreTx,
    input: CloseShiftInput,
) -> Result<Committed, LogbookError> {
    let mut shift = tx
        .shift_for_update(&input.shift_id)
        .await?
        .ok_or_else(|| LogbookError::shift_not_found(&input.shift_id))?;
    if shift.closed {
        return Err(LogbookError::AlreadyClosed(shift.id));
    }

    let records = tx.records_by_shift(&shift.id).await?;
    let (carry, archive): (Vec<&Record>, Vec<&Record>) = records
        .iter()
        .partition(|r| r.category() == Category::Pending);

    let closure = ShiftClosure {
        closed_by: input.actor_id,
        closed_by_name: input.actor_name,
        closed_at: Utc::now(),
        roster: input.roster,
    };
    tx.close_shift(&shift.id, &closure).await?;

    for record in &carry {
        tx.flag_carry_forward(&record.id, closure.closed_at).await?;
    }
    for record in &archive {
        let entry = ArchiveEntry {
            id: uuid::Uuid::new_v4().to_string(),
            shift_id: shift.id.clone(),
            record: (*record).clone(),
            closed_at: closure.closed_at,
            closed_by: closure.closed_by.clone(),
            closed_by_name: closure.closed_by_name.clone(),
        };
        tx.append_archive(&entry).await?;
        tx.delete_record(&record.id).await?;
    }

    let archived = archive.len();
    let carried_forward = carry.len();
    shift.apply_closure(&closure);

    Ok(Committed {
        archived,
        carried_forward,
        bundle: ReportBundle {
            shift,
            records,
            roster: closure.roster,
            closed_by_name: closure.closed_by_name,
            closed_at: closure.closed_at,
        },
    })
}
