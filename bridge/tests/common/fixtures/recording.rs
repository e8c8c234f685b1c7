//! Recording implementations of the reporter and sink seams

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;

use unas_bridge::errors::RegistryError;
use unas_bridge::registry::{EntityDescriptor, EntitySink};
use unas_bridge::services::{Issue, IssueReporter};

#[derive(Default)]
pub struct RecordingReporter {
    raised: Mutex<Vec<(String, String)>>,
    resolved: Mutex<Vec<(String, String)>>,
    open: Mutex<BTreeSet<(String, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raised(&self) -> Vec<(String, String)> {
        self.raised.lock().clone()
    }

    pub fn resolved(&self) -> Vec<(String, String)> {
        self.resolved.lock().clone()
    }

    pub fn is_open(&self, entry_id: &str, issue_id: &str) -> bool {
        self.open
            .lock()
            .contains(&(entry_id.to_string(), issue_id.to_string()))
    }
}

#[async_trait]
impl IssueReporter for RecordingReporter {
    async fn raise(&self, entry_id: &str, issue: &Issue) {
        let key = (entry_id.to_string(), issue.id.to_string());
        self.raised.lock().push(key.clone());
        self.open.lock().insert(key);
    }

    async fn resolve(&self, entry_id: &str, issue_id: &str) {
        let key = (entry_id.to_string(), issue_id.to_string());
        self.resolved.lock().push(key.clone());
        self.open.lock().remove(&key);
    }
}

/// Keeps every batch handed to a platform
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<EntityDescriptor>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<EntityDescriptor>> {
        self.batches.lock().clone()
    }

    pub fn unique_ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .map(|entity| entity.unique_id.clone())
            .collect()
    }
}

#[async_trait]
impl EntitySink for RecordingSink {
    async fn add_entities(&self, entities: Vec<EntityDescriptor>) -> Result<(), RegistryError> {
        self.batches.lock().push(entities);
        Ok(())
    }
}
