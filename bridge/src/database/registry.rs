//! Persisted entity registry.

use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use super::Database;
use crate::errors::RegistryError;
use crate::registry::{DeviceKey, EntityDescriptor, EntityKey, EntityRegistry};

#[async_trait]
impl EntityRegistry for Database {
    async fn register(&self, entity: &EntityDescriptor) -> Result<(), RegistryError> {
        let key = &entity.key;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO entities (
                entry_id, family, resource_id, platform, metric, unique_id, telemetry_key
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key.entry_id)
        .bind(key.family.as_str())
        .bind(&key.resource_id)
        .bind(key.platform.as_str())
        .bind(&key.metric)
        .bind(&entity.unique_id)
        .bind(&entity.telemetry_key)
        .execute(&mut *tx)
        .await?;

        if let Some(device) = key.device() {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO devices (entry_id, family, resource_id, identifier)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&device.entry_id)
            .bind(device.family.as_str())
            .bind(&device.resource_id)
            .bind(device.identifier())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Registered entity {}", entity.unique_id);
        Ok(())
    }

    async fn remove(&self, key: &EntityKey) -> Result<bool, RegistryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM entities
            WHERE entry_id = ? AND family = ? AND resource_id = ? AND platform = ? AND metric = ?
            "#,
        )
        .bind(&key.entry_id)
        .bind(key.family.as_str())
        .bind(&key.resource_id)
        .bind(key.platform.as_str())
        .bind(&key.metric)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn entities(&self, entry_id: &str) -> Result<Vec<EntityDescriptor>, RegistryError> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, family, resource_id, platform, metric, unique_id, telemetry_key
            FROM entities
            WHERE entry_id = ?
            ORDER BY family, resource_id, platform, metric
            "#,
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let family: String = row.try_get("family")?;
            let platform: String = row.try_get("platform")?;
            entities.push(EntityDescriptor {
                key: EntityKey {
                    entry_id: row.try_get("entry_id")?,
                    family: family.parse()?,
                    resource_id: row.try_get("resource_id")?,
                    platform: platform.parse()?,
                    metric: row.try_get("metric")?,
                },
                unique_id: row.try_get("unique_id")?,
                telemetry_key: row.try_get("telemetry_key")?,
            });
        }
        Ok(entities)
    }

    async fn remove_device(&self, device: &DeviceKey) -> Result<bool, RegistryError> {
        let result = sqlx::query(
            "DELETE FROM devices WHERE entry_id = ? AND family = ? AND resource_id = ?",
        )
        .bind(&device.entry_id)
        .bind(device.family.as_str())
        .bind(&device.resource_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn devices(&self, entry_id: &str) -> Result<Vec<DeviceKey>, RegistryError> {
        let rows = sqlx::query(
            "SELECT entry_id, family, resource_id FROM devices WHERE entry_id = ? ORDER BY family, resource_id",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;

        let mut devices = Vec::with_capacity(rows.len());
        for row in rows {
            let family: String = row.try_get("family")?;
            devices.push(DeviceKey {
                entry_id: row.try_get("entry_id")?,
                family: family.parse()?,
                resource_id: row.try_get("resource_id")?,
            });
        }
        Ok(devices)
    }
}
