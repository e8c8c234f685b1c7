use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

use super::{DeviceKey, EntityDescriptor, EntityKey, EntityRegistry};
use crate::errors::RegistryError;

/// In-process registry used by tests and by installations without a database
#[derive(Default)]
pub struct MemoryRegistry {
    entities: Mutex<BTreeMap<EntityKey, EntityDescriptor>>,
    devices: Mutex<BTreeSet<DeviceKey>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_unique_id(&self, unique_id: &str) -> bool {
        self.entities
            .lock()
            .values()
            .any(|entity| entity.unique_id == unique_id)
    }

    pub fn has_device(&self, identifier: &str) -> bool {
        self.devices
            .lock()
            .iter()
            .any(|device| device.identifier() == identifier)
    }
}

#[async_trait]
impl EntityRegistry for MemoryRegistry {
    async fn register(&self, entity: &EntityDescriptor) -> Result<(), RegistryError> {
        if let Some(device) = entity.key.device() {
            self.devices.lock().insert(device);
        }
        self.entities
            .lock()
            .insert(entity.key.clone(), entity.clone());
        Ok(())
    }

    async fn remove(&self, key: &EntityKey) -> Result<bool, RegistryError> {
        Ok(self.entities.lock().remove(key).is_some())
    }

    async fn entities(&self, entry_id: &str) -> Result<Vec<EntityDescriptor>, RegistryError> {
        Ok(self
            .entities
            .lock()
            .values()
            .filter(|entity| entity.key.entry_id == entry_id)
            .cloned()
            .collect())
    }

    async fn remove_device(&self, device: &DeviceKey) -> Result<bool, RegistryError> {
        Ok(self.devices.lock().remove(device))
    }

    async fn devices(&self, entry_id: &str) -> Result<Vec<DeviceKey>, RegistryError> {
        Ok(self
            .devices
            .lock()
            .iter()
            .filter(|device| device.entry_id == entry_id)
            .cloned()
            .collect())
    }
}
