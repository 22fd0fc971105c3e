// src/lib.rs

use std::sync::Arc;

pub mod closure;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod models;
pub mod records;
pub mod report;
pub mod routes;
pub mod shifts;
pub mod store;

#[cfg(test)]
mod test_utils;

use closure::ShiftClosureCoordinator;
use store::LogbookStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LogbookStore>,
    pub coordinator: ShiftClosureCoordinator,
}
