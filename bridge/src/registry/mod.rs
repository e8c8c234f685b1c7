//! Entity and device registry for dynamically discovered resources.
//!
//! Entities are keyed by `(installation, family, resource id, platform,
//! metric)` tuples. The flat unique-id strings the presentation layer sees are
//! derived from the key, never parsed back.

pub mod memory;
pub mod sink;

pub use memory::MemoryRegistry;
pub use sink::{DiscoverySlots, EntitySink, RegistrySink};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RegistryError;

/// Drive bay sensors, in registration order
pub const DRIVE_METRICS: &[&str] = &[
    "temperature",
    "model",
    "serial",
    "rpm",
    "firmware",
    "status",
    "total_size",
    "power_on_hours",
    "bad_sectors",
];

pub const NVME_METRICS: &[&str] = &[
    "temperature",
    "model",
    "serial",
    "firmware",
    "status",
    "total_size",
    "power_on_hours",
    "percentage_used",
    "available_spare",
    "media_errors",
    "unsafe_shutdowns",
];

pub const POOL_METRICS: &[&str] = &["usage", "size", "used", "available"];

pub const BACKUP_SENSOR_METRICS: &[&str] = &["last_run_status", "last_run_time", "destination"];
pub const BACKUP_BUTTON_METRICS: &[&str] = &["run_now"];
pub const BACKUP_SWITCH_METRICS: &[&str] = &["schedule_enabled"];

/// Network share protocols and the count metric each one publishes
pub const SHARE_PROTOCOLS: &[(&str, &str)] = &[("smb", "connections"), ("nfs", "mounts")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFamily {
    DriveBay,
    NvmeSlot,
    StoragePool,
    NetworkShare,
    BackupTask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityPlatform {
    Sensor,
    Button,
    Switch,
}

impl ResourceFamily {
    pub const ALL: [ResourceFamily; 5] = [
        ResourceFamily::DriveBay,
        ResourceFamily::NvmeSlot,
        ResourceFamily::StoragePool,
        ResourceFamily::NetworkShare,
        ResourceFamily::BackupTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceFamily::DriveBay => "drive_bay",
            ResourceFamily::NvmeSlot => "nvme_slot",
            ResourceFamily::StoragePool => "storage_pool",
            ResourceFamily::NetworkShare => "network_share",
            ResourceFamily::BackupTask => "backup_task",
        }
    }

    /// Resources whose state arrives over the bus rather than the backup API
    pub fn is_telemetry_backed(&self) -> bool {
        !matches!(self, ResourceFamily::BackupTask)
    }

    /// Families that group their entities under a device
    pub fn has_device(&self) -> bool {
        matches!(
            self,
            ResourceFamily::DriveBay | ResourceFamily::NvmeSlot | ResourceFamily::BackupTask
        )
    }

    /// Fixed sub-entity set registered for one resource
    pub fn metrics(&self, platform: EntityPlatform, resource_id: &str) -> &'static [&'static str] {
        match (self, platform) {
            (ResourceFamily::DriveBay, EntityPlatform::Sensor) => DRIVE_METRICS,
            (ResourceFamily::NvmeSlot, EntityPlatform::Sensor) => NVME_METRICS,
            (ResourceFamily::StoragePool, EntityPlatform::Sensor) => POOL_METRICS,
            (ResourceFamily::NetworkShare, EntityPlatform::Sensor) => match resource_id {
                "smb" => &["connections"],
                "nfs" => &["mounts"],
                _ => &[],
            },
            (ResourceFamily::BackupTask, EntityPlatform::Sensor) => BACKUP_SENSOR_METRICS,
            (ResourceFamily::BackupTask, EntityPlatform::Button) => BACKUP_BUTTON_METRICS,
            (ResourceFamily::BackupTask, EntityPlatform::Switch) => BACKUP_SWITCH_METRICS,
            _ => &[],
        }
    }

    /// Telemetry store key backing one sub-entity
    pub fn telemetry_key(&self, resource_id: &str, metric: &str) -> Option<String> {
        match self {
            ResourceFamily::DriveBay => Some(format!("unas_hdd_{}_{}", resource_id, metric)),
            ResourceFamily::NvmeSlot => Some(format!("unas_nvme_{}_{}", resource_id, metric)),
            ResourceFamily::StoragePool => Some(format!("unas_pool{}_{}", resource_id, metric)),
            ResourceFamily::NetworkShare => Some(format!("unas_{}_{}", resource_id, metric)),
            ResourceFamily::BackupTask => None,
        }
    }

    /// Retained topics cleared with tombstones when a resource disappears
    pub fn retained_topics(&self, root: &str, resource_id: &str) -> Vec<String> {
        let namespace = match self {
            ResourceFamily::DriveBay => format!("{}/hdd/{}", root, resource_id),
            ResourceFamily::NvmeSlot => format!("{}/nvme/{}", root, resource_id),
            ResourceFamily::StoragePool => format!("{}/pool/{}", root, resource_id),
            ResourceFamily::NetworkShare => {
                let mut topics: Vec<String> = self
                    .metrics(EntityPlatform::Sensor, resource_id)
                    .iter()
                    .map(|metric| format!("{}/{}/{}", root, resource_id, metric))
                    .collect();
                if !topics.is_empty() {
                    topics.push(format!("{}/{}/clients", root, resource_id));
                }
                return topics;
            }
            ResourceFamily::BackupTask => return Vec::new(),
        };
        self.metrics(EntityPlatform::Sensor, resource_id)
            .iter()
            .map(|metric| format!("{}/{}", namespace, metric))
            .collect()
    }

    fn device_tag(&self) -> &'static str {
        match self {
            ResourceFamily::DriveBay => "hdd",
            ResourceFamily::NvmeSlot => "nvme",
            ResourceFamily::StoragePool => "pool",
            ResourceFamily::NetworkShare => "share",
            ResourceFamily::BackupTask => "backup",
        }
    }
}

impl EntityPlatform {
    pub const ALL: [EntityPlatform; 3] = [
        EntityPlatform::Sensor,
        EntityPlatform::Button,
        EntityPlatform::Switch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPlatform::Sensor => "sensor",
            EntityPlatform::Button => "button",
            EntityPlatform::Switch => "switch",
        }
    }
}

impl fmt::Display for ResourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for EntityPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceFamily {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == s)
            .ok_or_else(|| RegistryError::Storage {
                reason: format!("unknown resource family '{}'", s),
            })
    }
}

impl FromStr for EntityPlatform {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityPlatform::ALL
            .into_iter()
            .find(|platform| platform.as_str() == s)
            .ok_or_else(|| RegistryError::Storage {
                reason: format!("unknown platform '{}'", s),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey {
    pub entry_id: String,
    pub family: ResourceFamily,
    pub resource_id: String,
}

impl DeviceKey {
    /// e.g. `<entry>_hdd_3`, `<entry>_backup_<task>`
    pub fn identifier(&self) -> String {
        format!("{}_{}_{}", self.entry_id, self.family.device_tag(), self.resource_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entry_id: String,
    pub family: ResourceFamily,
    pub resource_id: String,
    pub platform: EntityPlatform,
    pub metric: String,
}

impl EntityKey {
    pub fn new(
        entry_id: &str,
        family: ResourceFamily,
        resource_id: &str,
        platform: EntityPlatform,
        metric: &str,
    ) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            family,
            resource_id: resource_id.to_string(),
            platform,
            metric: metric.to_string(),
        }
    }

    /// `<entry>_<telemetry key>` for telemetry-backed entities,
    /// `<entry>_backup_<task>_<metric>` for backup entities
    pub fn unique_id(&self) -> String {
        match self.family.telemetry_key(&self.resource_id, &self.metric) {
            Some(key) => format!("{}_{}", self.entry_id, key),
            None => format!("{}_backup_{}_{}", self.entry_id, self.resource_id, self.metric),
        }
    }

    pub fn device(&self) -> Option<DeviceKey> {
        self.family.has_device().then(|| DeviceKey {
            entry_id: self.entry_id.clone(),
            family: self.family,
            resource_id: self.resource_id.clone(),
        })
    }
}

/// A registered dynamic entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub key: EntityKey,
    pub unique_id: String,
    pub telemetry_key: Option<String>,
}

impl EntityDescriptor {
    pub fn new(key: EntityKey) -> Self {
        Self {
            unique_id: key.unique_id(),
            telemetry_key: key.family.telemetry_key(&key.resource_id, &key.metric),
            key,
        }
    }

    /// Every sub-entity of one resource on one platform
    pub fn full_set(
        entry_id: &str,
        family: ResourceFamily,
        resource_id: &str,
        platform: EntityPlatform,
    ) -> Vec<Self> {
        family
            .metrics(platform, resource_id)
            .iter()
            .map(|metric| Self::new(EntityKey::new(entry_id, family, resource_id, platform, metric)))
            .collect()
    }
}

/// Persistent store of dynamic entities and their device groupings
#[async_trait]
pub trait EntityRegistry: Send + Sync {
    /// Insert or replace an entity, creating its device if the family has one
    async fn register(&self, entity: &EntityDescriptor) -> Result<(), RegistryError>;

    /// Returns whether the entity existed
    async fn remove(&self, key: &EntityKey) -> Result<bool, RegistryError>;

    async fn entities(&self, entry_id: &str) -> Result<Vec<EntityDescriptor>, RegistryError>;

    /// Returns whether the device existed
    async fn remove_device(&self, device: &DeviceKey) -> Result<bool, RegistryError>;

    async fn devices(&self, entry_id: &str) -> Result<Vec<DeviceKey>, RegistryError>;
}
