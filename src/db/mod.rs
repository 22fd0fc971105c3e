// src/db/mod.rs

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::info;

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Pool<Postgres>> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("connecting to PostgreSQL")?;
    info!(max_connections, "connected to PostgreSQL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running migrations")?;
    info!("migrations applied");

    Ok(pool)
}
