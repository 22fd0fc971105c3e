// src/config.rs

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub reports_dir: PathBuf,
    pub public_base_url: String,
    /// When set, reports are uploaded here instead of written to `reports_dir`.
    pub document_upload_url: Option<String>,
    pub upload_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(p) => p.parse().with_context(|| format!("PORT must be a port number, got {p:?}"))?,
            None => 8080,
        };

        let store = match var("LOGBOOK_STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("LOGBOOK_STORE must be `postgres` or `memory`, got {other:?}"),
        };

        let database_url = var("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set (or LOGBOOK_STORE=memory)");
        }

        let db_max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(n) => n.parse().context("DB_MAX_CONNECTIONS must be a positive integer")?,
            None => 10,
        };

        let upload_timeout = match var("UPLOAD_TIMEOUT_SECS") {
            Some(n) => Duration::from_secs(n.parse().context("UPLOAD_TIMEOUT_SECS must be an integer")?),
            None => Duration::from_secs(60),
        };

        Ok(Config {
            port,
            store,
            database_url,
            db_max_connections,
            reports_dir: var("REPORTS_DIR").unwrap_or_else(|| "./reports".into()).into(),
            public_base_url: var("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://127.0.0.1:{port}")),
            document_upload_url: var("DOCUMENT_UPLOAD_URL"),
            upload_timeout,
        })
    }
}
