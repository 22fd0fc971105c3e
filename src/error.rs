// src/error.rs

use crate::store::StoreError;

/// Failure taxonomy shared by the closure coordinator and the record/shift services.
///
/// `NotFound`, `AlreadyClosed` and `Validation` are client errors and are never retried.
/// `Storage` is transient: the whole call may be retried because closure is all-or-nothing.
/// `ReportGenerationFailed` is a partial success: the data is already closed and archived,
/// only the report artifact is missing and can be backfilled.
#[derive(Debug, thiserror::Error)]
pub enum LogbookError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("shift '{0}' is already closed")]
    AlreadyClosed(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("shift '{shift_id}' was closed but its report could not be produced: {reason}")]
    ReportGenerationFailed {
        shift_id: String,
        archived_count: usize,
        carried_forward_count: usize,
        reason: String,
    },
}

impl LogbookError {
    pub fn shift_not_found(id: &str) -> Self {
        LogbookError::NotFound { entity: "shift", id: id.to_owned() }
    }

    pub fn record_not_found(id: &str) -> Self {
        LogbookError::NotFound { entity: "record", id: id.to_owned() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        LogbookError::Validation(vec![msg.into()])
    }

    /// Wire code used by the HTTP layer and by callers deciding on retries.
    pub fn code(&self) -> &'static str {
        match self {
            LogbookError::NotFound { .. } => "NOT_FOUND",
            LogbookError::AlreadyClosed(_) => "ALREADY_CLOSED",
            LogbookError::Validation(_) => "VALIDATION_FAILED",
            LogbookError::Storage(_) => "STORAGE_FAILURE",
            LogbookError::ReportGenerationFailed { .. } => "REPORT_GENERATION_FAILED",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LogbookError::Storage(_))
    }
}
