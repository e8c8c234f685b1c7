use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ssh::BackupTask;
use crate::telemetry::TelemetrySnapshot;

/// Composite state exposed after each refresh cycle
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorData {
    pub scripts_installed: bool,
    pub ssh_connected: bool,
    pub monitor_running: bool,
    pub fan_control_running: bool,
    /// Derived telemetry availability
    pub available: bool,
    pub telemetry: TelemetrySnapshot,
    pub backup_tasks: Vec<BackupTask>,
    /// Why the last cycle fell back to the previous state
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}
