//! Installation identity and version markers.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::records::InstallationRecord;
use super::Database;
use crate::deploy::InstallLedger;

impl Database {
    /// Entry id of an appliance, generated and stored on first use
    pub async fn entry_id_for(&self, appliance: &str) -> Result<String> {
        let existing = sqlx::query("SELECT entry_id FROM installations WHERE appliance = ?")
            .bind(appliance)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = existing {
            return Ok(row.try_get("entry_id")?);
        }

        let entry_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO installations (appliance, entry_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(appliance)
        .bind(&entry_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!("Created installation {} for appliance {}", entry_id, appliance);
        Ok(entry_id)
    }

    pub async fn get_installation(&self, appliance: &str) -> Result<Option<InstallationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT appliance, entry_id, last_deploy_version, last_cleanup_version,
                   created_at, updated_at
            FROM installations
            WHERE appliance = ?
            "#,
        )
        .bind(appliance)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(InstallationRecord {
                appliance: row.try_get("appliance")?,
                entry_id: row.try_get("entry_id")?,
                last_deploy_version: row.try_get("last_deploy_version")?,
                last_cleanup_version: row.try_get("last_cleanup_version")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }

    /// Drop an installation together with its entities, devices and issues
    pub async fn delete_installation(&self, entry_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["entities", "devices", "issues", "installations"] {
            sqlx::query(&format!("DELETE FROM {} WHERE entry_id = ?", table))
                .bind(entry_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!("Deleted installation {}", entry_id);
        Ok(())
    }

    async fn read_marker(&self, entry_id: &str, column: &str) -> Result<Option<String>> {
        let row = sqlx::query(&format!(
            "SELECT {} AS marker FROM installations WHERE entry_id = ?",
            column
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.try_get("marker")?),
            None => Ok(None),
        }
    }

    async fn write_marker(&self, entry_id: &str, column: &str, version: &str) -> Result<()> {
        let result = sqlx::query(&format!(
            "UPDATE installations SET {} = ?, updated_at = ? WHERE entry_id = ?",
            column
        ))
        .bind(version)
        .bind(Utc::now())
        .bind(entry_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                error!("No installation {} to record {} on", entry_id, column);
                Err(anyhow::anyhow!("unknown installation {}", entry_id))
            }
            Ok(_) => {
                debug!("Recorded {} = {} for {}", column, version, entry_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to record {} for {}: {}", column, entry_id, e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl InstallLedger for Database {
    async fn deployed_version(&self, entry_id: &str) -> Result<Option<String>> {
        self.read_marker(entry_id, "last_deploy_version").await
    }

    async fn record_deployment(&self, entry_id: &str, version: &str) -> Result<()> {
        self.write_marker(entry_id, "last_deploy_version", version).await
    }

    async fn cleanup_version(&self, entry_id: &str) -> Result<Option<String>> {
        self.read_marker(entry_id, "last_cleanup_version").await
    }

    async fn record_cleanup(&self, entry_id: &str, version: &str) -> Result<()> {
        self.write_marker(entry_id, "last_cleanup_version", version).await
    }
}
