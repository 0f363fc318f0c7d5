//! Persistency module for derived document properties
//!
//! Computed properties are keyed by item id, item version and property name
//! and live in a SQLite database managed through SQLx, so they survive
//! process restarts.

pub mod property_repository;

use log::info;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};

use crate::errors::Result;

/// Database manager for the derived-property store
pub struct PersistencyManager {
    pool: Pool<Sqlite>,
    db_path: PathBuf,
}

impl PersistencyManager {
    /// Open (creating if needed) the database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&database_url)
            .await?;

        info!(
            "Initialized database connection pool at: {}",
            db_path.display()
        );

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Initialize database schema (create tables if they don't exist)
    pub async fn init_database(&self) -> Result<()> {
        info!("Initializing database schema...");
        self.create_derived_properties_table().await?;
        info!("Database schema initialized successfully");
        Ok(())
    }

    async fn create_derived_properties_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS derived_properties (
                item_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                property TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (item_id, version, property)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_derived_properties_item ON derived_properties(item_id, version)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Flush and close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
