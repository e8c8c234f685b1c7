//! Bridge to the appliance's loopback-only backup management API.
//!
//! Calls are issued with `curl` from inside the remote session, with identity
//! headers built from the appliance's local user cache. Empty or non-JSON
//! responses are treated as an empty object, since this data is auxiliary.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{quote, RemoteShell};
use crate::constants::backup_api;
use crate::errors::{BridgeError, ControlError, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
    Patch,
}

impl ApiMethod {
    fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
            ApiMethod::Patch => "PATCH",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupRemote {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "oauth2Account", default)]
    pub oauth2_account: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRun {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_time: Option<Value>,
    #[serde(default)]
    pub end_time: Option<Value>,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub error_codes: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Remote backup job as reported by the appliance.
///
/// The schedule is kept as an opaque object so an update can send it back
/// with only the `enable` flag changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupTask {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub remote: BackupRemote,
    #[serde(default)]
    pub destination_dir: Option<String>,
    #[serde(default)]
    pub schedule: Map<String, Value>,
    #[serde(default)]
    pub last_run: Option<BackupRun>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BackupTask {
    pub fn schedule_enabled(&self) -> bool {
        self.schedule
            .get("enable")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Account name for cloud remotes, otherwise the destination directory
    pub fn destination(&self) -> &str {
        self.remote
            .oauth2_account
            .as_deref()
            .filter(|account| !account.is_empty())
            .or(self.destination_dir.as_deref())
            .unwrap_or("")
    }

    pub fn last_run_status(&self) -> Option<&str> {
        self.last_run.as_ref().and_then(|run| run.status.as_deref())
    }
}

/// Task ids are interpolated into a URL on the remote command line
pub fn is_valid_task_id(task_id: &str) -> bool {
    !task_id.is_empty()
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub(crate) fn api_command(method: ApiMethod, path: &str, body: Option<&Value>) -> String {
    let mut command = format!(
        "curl -s -X {} \"{}{}\" \
         -H \"X-UserId: $(jq -r '.[0].id' {})\" \
         -H \"X-UserRole: {}\" \
         -H \"X-UserAccessMask: {}\" \
         -H \"X-UserPermissionMask: {}\"",
        method.as_str(),
        backup_api::BASE_URL,
        path,
        backup_api::USER_CACHE_FILE,
        backup_api::USER_ROLE,
        backup_api::ACCESS_MASK,
        backup_api::PERMISSION_MASK,
    );
    if let Some(body) = body {
        command.push_str(" -H \"Content-Type: application/json\" -d ");
        command.push_str(&quote(&body.to_string()));
    }
    command
}

pub(crate) fn parse_response(stdout: &str, method: ApiMethod, path: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        debug!("Backup API returned empty response for {} {}", method.as_str(), path);
        return Value::Object(Map::new());
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse backup API response for {}: {}", path, e);
            Value::Object(Map::new())
        }
    }
}

pub struct BackupApi {
    shell: Arc<dyn RemoteShell>,
}

impl BackupApi {
    pub fn new(shell: Arc<dyn RemoteShell>) -> Self {
        Self { shell }
    }

    /// Issue one privileged call. Only session failures are errors.
    pub async fn request(
        &self,
        method: ApiMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, SessionError> {
        let output = self.shell.execute(&api_command(method, path, body)).await?;
        Ok(parse_response(&output.stdout, method, path))
    }

    pub async fn list_tasks(&self) -> Result<Vec<BackupTask>, SessionError> {
        let response = self
            .request(ApiMethod::Get, backup_api::TASKS_PATH, None)
            .await?;

        let items = match response.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => return Ok(Vec::new()),
        };

        let tasks = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<BackupTask>(item) {
                Ok(task) => Some(task),
                Err(e) => {
                    debug!("Skipping malformed backup task: {}", e);
                    None
                }
            })
            .collect();
        Ok(tasks)
    }

    pub async fn run_task(&self, task_id: &str) -> Result<(), BridgeError> {
        ensure_valid_id(task_id)?;
        let path = format!("{}/{}", backup_api::RUN_TASK_PATH, task_id);
        let response = self.request(ApiMethod::Post, &path, None).await?;

        if response.get("data").and_then(Value::as_str) == Some("OK") {
            debug!("Backup task {} started", task_id);
            Ok(())
        } else {
            Err(ControlError::Rejected {
                action: format!("run backup task {}", task_id),
                reason: response.to_string(),
            }
            .into())
        }
    }

    pub async fn update_task(&self, task_id: &str, updates: &Value) -> Result<Value, BridgeError> {
        ensure_valid_id(task_id)?;
        let path = format!("{}/{}", backup_api::TASKS_PATH, task_id);
        Ok(self.request(ApiMethod::Patch, &path, Some(updates)).await?)
    }

    /// Resend the task's schedule with `enable` toggled
    pub async fn set_schedule_enabled(
        &self,
        task: &BackupTask,
        enabled: bool,
    ) -> Result<Value, BridgeError> {
        let mut schedule = task.schedule.clone();
        schedule.insert("enable".to_string(), Value::Bool(enabled));
        self.update_task(&task.id, &json!({ "schedule": schedule }))
            .await
    }
}

fn ensure_valid_id(task_id: &str) -> Result<(), ControlError> {
    if is_valid_task_id(task_id) {
        Ok(())
    } else {
        Err(ControlError::UnknownTask {
            task_id: task_id.to_string(),
        })
    }
}
