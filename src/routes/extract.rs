// src/routes/extract.rs

use axum::extract::{rejection::JsonRejection, FromRequest};

use super::ApiError;
use crate::error::LogbookError;

/// JSON request body. Malformed or ill-typed bodies come back as `VALIDATION_FAILED`
/// in the usual error envelope instead of axum's plain-text rejection.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Logbook(LogbookError::invalid(rejection.body_text()))
    }
}
