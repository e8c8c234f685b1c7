//! Database record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub appliance: String,
    pub entry_id: String,
    pub last_deploy_version: Option<String>,
    pub last_cleanup_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub entry_id: String,
    pub issue_id: String,
    pub severity: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}
