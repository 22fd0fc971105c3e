// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use surgical_logbook::{
    closure::ShiftClosureCoordinator,
    config::{Config, StoreBackend},
    db,
    documents::{DocumentStore, HttpDocumentStore, LocalDocumentStore},
    report::PdfReportGenerator,
    routes,
    store::{LogbookStore, MemoryStore, PgStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("surgical_logbook=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn LogbookStore> = match (config.store, &config.database_url) {
        (StoreBackend::Postgres, Some(url)) => {
            let pool = db::connect(url, config.db_max_connections).await?;
            Arc::new(PgStore::new(pool))
        }
        (StoreBackend::Postgres, None) => anyhow::bail!("DATABASE_URL must be set"),
        (StoreBackend::Memory, _) => {
            warn!("using the in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Reports either go to an upload endpoint or are served from disk by this process
    let (documents, served_dir): (Arc<dyn DocumentStore>, Option<PathBuf>) =
        match &config.document_upload_url {
            Some(url) => {
                info!(%url, "uploading reports over HTTP");
                (Arc::new(HttpDocumentStore::new(url, config.upload_timeout)?), None)
            }
            None => {
                let local = LocalDocumentStore::new(&config.reports_dir, &config.public_base_url);
                tokio::fs::create_dir_all(local.root()).await?;
                info!(dir = %local.root().display(), "writing reports to disk");
                let served = local.root().to_path_buf();
                (Arc::new(local), Some(served))
            }
        };

    let coordinator =
        ShiftClosureCoordinator::new(store.clone(), Arc::new(PdfReportGenerator), documents);
    let state = AppState { store, coordinator };
    let app = routes::router(state, served_dir.as_deref());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, base = %config.public_base_url, "API listening");

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
