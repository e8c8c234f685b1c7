use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::database::{Database, IssueRecord};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
        }
    }
}

/// A persistent user-visible diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: &'static str,
    pub severity: IssueSeverity,
    pub message: String,
}

impl Issue {
    pub fn mqtt_missing() -> Self {
        Self {
            id: "mqtt_missing",
            severity: IssueSeverity::Error,
            message: "The MQTT broker connection is not available. Telemetry cannot be received until it is restored.".to_string(),
        }
    }
}

/// Where the coordinator reports conditions that need user attention
#[async_trait]
pub trait IssueReporter: Send + Sync {
    async fn raise(&self, entry_id: &str, issue: &Issue);
    async fn resolve(&self, entry_id: &str, issue_id: &str);
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub timestamp: DateTime<Utc>,
    pub issue_id: String,
    pub severity: String,
    pub entry_id: String,
    pub message: String,
    pub resolved: bool,
}

/// Persists issues and posts a webhook alert on every open/resolve
/// transition. Repeated raises of an open issue only refresh the stored
/// message.
#[derive(Clone)]
pub struct AlertService {
    webhook_url: String,
    client: Client,
    database: Option<Arc<Database>>,
    open: Arc<Mutex<HashMap<(String, String), IssueRecord>>>,
}

impl AlertService {
    pub fn new(webhook_url: String, database: Option<Arc<Database>>) -> Self {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client for alerts: {}", e);
                Client::new()
            });

        Self {
            webhook_url,
            client,
            database,
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Issues raised since start, newest first
    pub async fn open_issues(&self) -> Vec<IssueRecord> {
        let mut issues: Vec<IssueRecord> = self.open.lock().await.values().cloned().collect();
        issues.sort_by(|a, b| b.raised_at.cmp(&a.raised_at));
        issues
    }

    async fn send_webhook(&self, payload: &AlertPayload) {
        if self.webhook_url.is_empty() {
            debug!("No webhook URL configured, skipping alert");
            return;
        }

        match timeout(
            WEBHOOK_TIMEOUT,
            self.client.post(&self.webhook_url).json(payload).send(),
        )
        .await
        {
            Ok(Ok(response)) => {
                if response.status().is_success() {
                    info!("Alert sent for {}: {}", payload.entry_id, payload.issue_id);
                } else {
                    warn!(
                        "Alert webhook returned status: {} for {}",
                        response.status(),
                        payload.entry_id
                    );
                }
            }
            Ok(Err(e)) => warn!("Failed to send alert for {}: {}", payload.entry_id, e),
            Err(_) => warn!("Alert webhook timeout for {}", payload.entry_id),
        }
    }
}

#[async_trait]
impl IssueReporter for AlertService {
    async fn raise(&self, entry_id: &str, issue: &Issue) {
        let record = IssueRecord {
            entry_id: entry_id.to_string(),
            issue_id: issue.id.to_string(),
            severity: issue.severity.as_str().to_string(),
            message: issue.message.clone(),
            raised_at: Utc::now(),
        };

        if let Some(database) = &self.database {
            if let Err(e) = database
                .upsert_issue(entry_id, issue.id, issue.severity.as_str(), &issue.message)
                .await
            {
                error!("Failed to persist issue {} for {}: {}", issue.id, entry_id, e);
            }
        }

        let newly_opened = {
            let mut open = self.open.lock().await;
            let key = (entry_id.to_string(), issue.id.to_string());
            let existed = open.contains_key(&key);
            open.entry(key).or_insert(record.clone()).message = issue.message.clone();
            !existed
        };

        if newly_opened {
            error!("Issue {} raised for {}: {}", issue.id, entry_id, issue.message);
            self.send_webhook(&AlertPayload {
                timestamp: record.raised_at,
                issue_id: record.issue_id,
                severity: record.severity,
                entry_id: record.entry_id,
                message: record.message,
                resolved: false,
            })
            .await;
        }
    }

    async fn resolve(&self, entry_id: &str, issue_id: &str) {
        let was_open = self
            .open
            .lock()
            .await
            .remove(&(entry_id.to_string(), issue_id.to_string()))
            .is_some();

        let was_persisted = match &self.database {
            Some(database) => match database.delete_issue(entry_id, issue_id).await {
                Ok(deleted) => deleted,
                Err(e) => {
                    error!("Failed to clear issue {} for {}: {}", issue_id, entry_id, e);
                    false
                }
            },
            None => false,
        };

        if was_open || was_persisted {
            info!("Issue {} resolved for {}", issue_id, entry_id);
            self.send_webhook(&AlertPayload {
                timestamp: Utc::now(),
                issue_id: issue_id.to_string(),
                severity: IssueSeverity::Warning.as_str().to_string(),
                entry_id: entry_id.to_string(),
                message: "Condition cleared".to_string(),
                resolved: true,
            })
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn raising_twice_keeps_one_open_issue() {
        let service = AlertService::new(String::new(), None);
        service.raise("E1", &Issue::mqtt_missing()).await;
        service.raise("E1", &Issue::mqtt_missing()).await;
        assert_eq!(service.open_issues().await.len(), 1);

        service.resolve("E1", "mqtt_missing").await;
        assert!(service.open_issues().await.is_empty());
    }
}
