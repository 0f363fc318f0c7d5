use log::debug;
use sqlx::{Pool, Row, Sqlite};

use crate::errors::Result;

/// Rows of `derived_properties`, one per (item, version, property)
pub struct PropertyRepository {
    pool: Pool<Sqlite>,
    /// Newest versions kept per item; `None` keeps every version
    retained_versions: Option<usize>,
}

impl PropertyRepository {
    pub fn new(pool: Pool<Sqlite>, retained_versions: Option<usize>) -> Self {
        Self {
            pool,
            retained_versions,
        }
    }

    /// Serialized value stored for `property` of `item_id` at `version`
    pub async fn get_property(
        &self,
        item_id: &str,
        version: u64,
        property: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT value FROM derived_properties WHERE item_id = ? AND version = ? AND property = ?",
        )
        .bind(item_id)
        .bind(version as i64)
        .bind(property)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    /// Store a serialized value, replacing any previous one for the same key
    pub async fn store_property(
        &self,
        item_id: &str,
        version: u64,
        property: &str,
        value: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO derived_properties (item_id, version, property, value, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(item_id)
        .bind(version as i64)
        .bind(property)
        .bind(value)
        .execute(&self.pool)
        .await?;

        debug!("💾 Stored {} for {} at version {}", property, item_id, version);

        if let Some(keep) = self.retained_versions {
            self.prune_versions(item_id, keep).await?;
        }
        Ok(())
    }

    /// Drop every version of `item_id` except the newest `keep`
    pub async fn prune_versions(&self, item_id: &str, keep: usize) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM derived_properties
            WHERE item_id = ? AND version NOT IN (
                SELECT DISTINCT version FROM derived_properties
                WHERE item_id = ?
                ORDER BY version DESC
                LIMIT ?
            )
            "#,
        )
        .bind(item_id)
        .bind(item_id)
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!("🧹 Pruned {} old property rows for {}", removed, item_id);
        }
        Ok(removed)
    }

    /// Versions of `item_id` that have at least one stored property, newest first
    pub async fn stored_versions(&self, item_id: &str) -> Result<Vec<u64>> {
        let rows = sqlx::query(
            "SELECT DISTINCT version FROM derived_properties WHERE item_id = ? ORDER BY version DESC",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| row.get::<i64, _>("version") as u64)
            .collect())
    }
}
