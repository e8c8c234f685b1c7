//! Persisted diagnostics.

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use super::records::IssueRecord;
use super::Database;

impl Database {
    /// Insert an issue, keeping the original raise time if it is already open
    pub async fn upsert_issue(
        &self,
        entry_id: &str,
        issue_id: &str,
        severity: &str,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO issues (entry_id, issue_id, severity, message, raised_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(entry_id, issue_id) DO UPDATE SET
                severity = excluded.severity,
                message = excluded.message
            "#,
        )
        .bind(entry_id)
        .bind(issue_id)
        .bind(severity)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        debug!("Issue {} open for {}", issue_id, entry_id);
        Ok(())
    }

    /// Returns whether the issue was open
    pub async fn delete_issue(&self, entry_id: &str, issue_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM issues WHERE entry_id = ? AND issue_id = ?")
            .bind(entry_id)
            .bind(issue_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_issues(&self) -> Result<Vec<IssueRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, issue_id, severity, message, raised_at
            FROM issues
            ORDER BY raised_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut issues = Vec::with_capacity(rows.len());
        for row in rows {
            issues.push(IssueRecord {
                entry_id: row.try_get("entry_id")?,
                issue_id: row.try_get("issue_id")?,
                severity: row.try_get("severity")?,
                message: row.try_get("message")?,
                raised_at: row.try_get("raised_at")?,
            });
        }
        Ok(issues)
    }
}
