//! Database layer for the bridge.
//!
//! This module provides SQLite persistence for:
//! - Installations (entry ids and deployment/cleanup version markers)
//! - The dynamic entity and device registry
//! - Open diagnostics raised by the polling coordinator
//!
//! The module is organized into submodules:
//! - `records` - Record types
//! - `installations` - Entry ids and the install ledger
//! - `registry` - Entity registry operations
//! - `issues` - Persisted diagnostics

mod installations;
mod issues;
mod records;
mod registry;

pub use records::*;

use anyhow::Result;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{error, info};

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Expose pool for integration test queries
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        info!("Initializing database at {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    error!("Failed to create database directory {:?}: {}", parent, e);
                    return Err(e.into());
                }
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = match SqlitePool::connect(&database_url).await {
            Ok(pool) => pool,
            Err(e) => {
                error!("Failed to connect to database {}: {}", database_url, e);
                return Err(e.into());
            }
        };

        let database = Self { pool };
        if let Err(e) = database.initialize_tables().await {
            error!("Database table initialization failed: {}", e);
            return Err(e);
        }

        info!("Database initialized");
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        let statements: [(&str, &str); 6] = [
            (
                "installations",
                r#"
                CREATE TABLE IF NOT EXISTS installations (
                    appliance TEXT PRIMARY KEY,
                    entry_id TEXT UNIQUE NOT NULL,
                    last_deploy_version TEXT,
                    last_cleanup_version TEXT,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL
                )
                "#,
            ),
            (
                "entities",
                r#"
                CREATE TABLE IF NOT EXISTS entities (
                    entry_id TEXT NOT NULL,
                    family TEXT NOT NULL,
                    resource_id TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    metric TEXT NOT NULL,
                    unique_id TEXT NOT NULL,
                    telemetry_key TEXT,
                    PRIMARY KEY (entry_id, family, resource_id, platform, metric)
                )
                "#,
            ),
            (
                "entities index",
                "CREATE INDEX IF NOT EXISTS idx_entities_entry ON entities(entry_id, family)",
            ),
            (
                "devices",
                r#"
                CREATE TABLE IF NOT EXISTS devices (
                    entry_id TEXT NOT NULL,
                    family TEXT NOT NULL,
                    resource_id TEXT NOT NULL,
                    identifier TEXT NOT NULL,
                    PRIMARY KEY (entry_id, family, resource_id)
                )
                "#,
            ),
            (
                "issues",
                r#"
                CREATE TABLE IF NOT EXISTS issues (
                    entry_id TEXT NOT NULL,
                    issue_id TEXT NOT NULL,
                    severity TEXT NOT NULL,
                    message TEXT NOT NULL,
                    raised_at DATETIME NOT NULL,
                    PRIMARY KEY (entry_id, issue_id)
                )
                "#,
            ),
            (
                "issues index",
                "CREATE INDEX IF NOT EXISTS idx_issues_raised ON issues(raised_at DESC)",
            ),
        ];

        for (name, sql) in statements {
            if let Err(e) = sqlx::query(sql).execute(&self.pool).await {
                error!("Failed to create {}: {}", name, e);
                return Err(e.into());
            }
            info!("{} ready", name);
        }
        Ok(())
    }
}
