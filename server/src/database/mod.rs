//! Database module
//!
//! This module provides all storage functionality including:
//! - The `DocumentStore` abstraction with memory and SQLite backends
//! - Retry/degrade wrapping for transient store failures
//! - Snapshot listeners over live query results
//! - Entity models and the typed `Repository`

pub mod markers;
pub mod memory;
pub mod models;
pub mod query;
pub mod repository;
pub mod resilient;
pub mod schema;
pub mod snapshots;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use models::*;
pub use query::{Direction, Op, Query};
pub use repository::{Entity, Repository};
pub use resilient::{Fetched, ResilientStore, RetryPolicy};
pub use schema::initialize_database;
pub use sqlite::SqliteStore;
pub use store::{Document, DocumentStore, StoreError, TransientCode};

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Build connection options shared by migration and application connections.
fn connect_options(db_path: &Path) -> std::result::Result<SqliteConnectOptions, sqlx::Error> {
    SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display())).map(
        |opts| {
            opts.create_if_missing(true)
                .busy_timeout(Duration::from_secs(5))
                .journal_mode(SqliteJournalMode::Wal)
        },
    )
}

/// Create and initialize a database connection pool.
///
/// Migrations run on a dedicated single-connection pool that is closed
/// before the application pool is created, so every pooled connection
/// sees the final schema.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::info!("Creating database connection pool at: {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let migration_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(db_path)?)
        .await?;

    initialize_database(&migration_pool).await?;
    migration_pool.close().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(connect_options(db_path)?)
        .await?;

    tracing::info!("Database pool created successfully");

    Ok(pool)
}
