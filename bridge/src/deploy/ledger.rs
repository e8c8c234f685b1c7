use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Per-installation version markers for deployment and upgrade cleanup
#[async_trait]
pub trait InstallLedger: Send + Sync {
    async fn deployed_version(&self, entry_id: &str) -> Result<Option<String>>;
    async fn record_deployment(&self, entry_id: &str, version: &str) -> Result<()>;
    async fn cleanup_version(&self, entry_id: &str) -> Result<Option<String>>;
    async fn record_cleanup(&self, entry_id: &str, version: &str) -> Result<()>;
}

/// Non-persistent ledger, used when no database is configured
#[derive(Default)]
pub struct MemoryLedger {
    deployed: Mutex<HashMap<String, String>>,
    cleaned: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl InstallLedger for MemoryLedger {
    async fn deployed_version(&self, entry_id: &str) -> Result<Option<String>> {
        Ok(self.deployed.lock().get(entry_id).cloned())
    }

    async fn record_deployment(&self, entry_id: &str, version: &str) -> Result<()> {
        self.deployed
            .lock()
            .insert(entry_id.to_string(), version.to_string());
        Ok(())
    }

    async fn cleanup_version(&self, entry_id: &str) -> Result<Option<String>> {
        Ok(self.cleaned.lock().get(entry_id).cloned())
    }

    async fn record_cleanup(&self, entry_id: &str, version: &str) -> Result<()> {
        self.cleaned
            .lock()
            .insert(entry_id.to_string(), version.to_string());
        Ok(())
    }
}
