use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use super::{EntityDescriptor, EntityPlatform, EntityRegistry};
use crate::errors::RegistryError;

/// Add-entity callback of one presentation platform
#[async_trait]
pub trait EntitySink: Send + Sync {
    async fn add_entities(&self, entities: Vec<EntityDescriptor>) -> Result<(), RegistryError>;
}

/// Sink that writes straight into an [`EntityRegistry`]
pub struct RegistrySink {
    registry: Arc<dyn EntityRegistry>,
}

impl RegistrySink {
    pub fn new(registry: Arc<dyn EntityRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EntitySink for RegistrySink {
    async fn add_entities(&self, entities: Vec<EntityDescriptor>) -> Result<(), RegistryError> {
        for entity in &entities {
            self.registry.register(entity).await?;
        }
        debug!("Registered {} entities", entities.len());
        Ok(())
    }
}

/// Per-platform sinks, filled in as each platform finishes its setup.
/// Discovery skips platforms whose sink is not attached yet.
#[derive(Default)]
pub struct DiscoverySlots {
    sensors: RwLock<Option<Arc<dyn EntitySink>>>,
    buttons: RwLock<Option<Arc<dyn EntitySink>>>,
    switches: RwLock<Option<Arc<dyn EntitySink>>>,
}

impl DiscoverySlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots with every platform pointing at the same sink
    pub fn all(sink: Arc<dyn EntitySink>) -> Self {
        let slots = Self::default();
        for platform in EntityPlatform::ALL {
            slots.attach(platform, sink.clone());
        }
        slots
    }

    fn slot(&self, platform: EntityPlatform) -> &RwLock<Option<Arc<dyn EntitySink>>> {
        match platform {
            EntityPlatform::Sensor => &self.sensors,
            EntityPlatform::Button => &self.buttons,
            EntityPlatform::Switch => &self.switches,
        }
    }

    pub fn attach(&self, platform: EntityPlatform, sink: Arc<dyn EntitySink>) {
        *self.slot(platform).write() = Some(sink);
    }

    pub fn detach_all(&self) {
        for platform in EntityPlatform::ALL {
            *self.slot(platform).write() = None;
        }
    }

    pub fn get(&self, platform: EntityPlatform) -> Option<Arc<dyn EntitySink>> {
        self.slot(platform).read().clone()
    }

    pub fn any_attached(&self) -> bool {
        EntityPlatform::ALL
            .into_iter()
            .any(|platform| self.slot(platform).read().is_some())
    }
}
