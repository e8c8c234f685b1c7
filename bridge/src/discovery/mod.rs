//! Resource-discovery reconciler.
//!
//! One [`FamilyTracker`] per (family, platform) pair holds the identifiers
//! that currently have entities. Each pass diffs them against what the fresh
//! telemetry snapshot or backup task list implies, retires what vanished
//! (registry entries, retained topics, device grouping) and registers the full
//! entity set for anything new.

pub mod detect;
pub mod tracker;

pub use tracker::{FamilyTracker, ReconcilePlan};

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DeviceModel;
use crate::messaging::{publish_tombstones, MessageBus};
use crate::registry::{
    DeviceKey, DiscoverySlots, EntityDescriptor, EntityKey, EntityPlatform, EntityRegistry,
    ResourceFamily,
};
use crate::ssh::BackupTask;
use crate::telemetry::TelemetrySnapshot;

const TRACKED: [(ResourceFamily, EntityPlatform); 7] = [
    (ResourceFamily::DriveBay, EntityPlatform::Sensor),
    (ResourceFamily::NvmeSlot, EntityPlatform::Sensor),
    (ResourceFamily::StoragePool, EntityPlatform::Sensor),
    (ResourceFamily::NetworkShare, EntityPlatform::Sensor),
    (ResourceFamily::BackupTask, EntityPlatform::Sensor),
    (ResourceFamily::BackupTask, EntityPlatform::Button),
    (ResourceFamily::BackupTask, EntityPlatform::Switch),
];

/// Changes applied to one (family, platform) pair in a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyChange {
    pub family: ResourceFamily,
    pub platform: EntityPlatform,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Inputs of one discovery pass
pub struct DiscoveryInput<'a> {
    pub snapshot: &'a TelemetrySnapshot,
    /// `None` when the task list could not be fetched this cycle
    pub backup_tasks: Option<&'a [BackupTask]>,
    pub now: Instant,
}

pub struct Discovery {
    entry_id: String,
    root: String,
    model: DeviceModel,
    registry: Arc<dyn EntityRegistry>,
    bus: Arc<dyn MessageBus>,
    trackers: Vec<FamilyTracker>,
    /// Pairs whose one-time orphan sweep has completed
    swept: Vec<bool>,
}

impl Discovery {
    pub fn new(
        entry_id: &str,
        root: &str,
        model: DeviceModel,
        registry: Arc<dyn EntityRegistry>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            root: root.to_string(),
            model,
            registry,
            bus,
            trackers: TRACKED
                .iter()
                .map(|(family, platform)| FamilyTracker::new(*family, *platform))
                .collect(),
            swept: vec![false; TRACKED.len()],
        }
    }

    /// Replace the tracker of one pair, e.g. to shorten a grace period
    pub fn with_tracker(mut self, tracker: FamilyTracker) -> Self {
        if let Some(slot) = self
            .trackers
            .iter_mut()
            .find(|t| t.family() == tracker.family() && t.platform() == tracker.platform())
        {
            *slot = tracker;
        }
        self
    }

    pub fn known(&self, family: ResourceFamily, platform: EntityPlatform) -> BTreeSet<String> {
        self.trackers
            .iter()
            .find(|t| t.family() == family && t.platform() == platform)
            .map(|t| t.known().clone())
            .unwrap_or_default()
    }

    /// Whether any bay, NVMe slot or pool has been materialised
    pub fn has_storage_resources(&self) -> bool {
        self.trackers.iter().any(|t| {
            matches!(
                t.family(),
                ResourceFamily::DriveBay | ResourceFamily::NvmeSlot | ResourceFamily::StoragePool
            ) && !t.known().is_empty()
        })
    }

    fn detected(&self, family: ResourceFamily, input: &DiscoveryInput<'_>) -> Option<BTreeSet<String>> {
        match family {
            ResourceFamily::DriveBay => Some(detect::drive_bays(input.snapshot)),
            ResourceFamily::NvmeSlot => Some(detect::nvme_slots(input.snapshot)),
            ResourceFamily::StoragePool => Some(detect::storage_pools(input.snapshot)),
            ResourceFamily::NetworkShare => Some(detect::network_shares(input.snapshot, self.model)),
            ResourceFamily::BackupTask => input.backup_tasks.map(detect::backup_tasks),
        }
    }

    /// Run one pass for every pair whose platform sink is attached
    pub async fn reconcile(&mut self, input: &DiscoveryInput<'_>, slots: &DiscoverySlots) -> Vec<FamilyChange> {
        let mut changes = Vec::new();
        for index in 0..self.trackers.len() {
            let family = self.trackers[index].family();
            let platform = self.trackers[index].platform();

            let Some(sink) = slots.get(platform) else {
                continue;
            };
            let Some(detected) = self.detected(family, input) else {
                debug!("Skipping {} discovery, no fresh data", family);
                continue;
            };

            let plan = self.trackers[index].plan(&detected, input.now);
            for id in &plan.removed {
                self.retire(family, platform, id).await;
            }
            if !plan.removed.is_empty() {
                info!("{} no longer detected: {:?}", family, plan.removed);
            }

            // Nothing arrived yet, so the registry is the better source of truth
            let authoritative = match family {
                ResourceFamily::BackupTask => true,
                _ => !input.snapshot.is_empty(),
            };
            let mut removed = plan.removed.clone();
            if authoritative && !self.swept[index] {
                if let Some(orphans) = self.sweep_orphans(index, &detected).await {
                    removed.extend(orphans);
                    self.swept[index] = true;
                }
            }

            let mut added = Vec::new();
            for id in &plan.added {
                let entities = EntityDescriptor::full_set(&self.entry_id, family, id, platform);
                let count = entities.len();
                match sink.add_entities(entities).await {
                    Ok(()) => {
                        debug!("Registered {} {} entities for {} {}", count, platform, family, id);
                        added.push(id.clone());
                    }
                    Err(e) => {
                        warn!("Failed to register {} {}: {}", family, id, e);
                        self.trackers[index].forget(id);
                    }
                }
            }
            if !added.is_empty() {
                info!("Discovered {} {}: {:?}", family, platform, added);
            }

            if !added.is_empty() || !removed.is_empty() {
                changes.push(FamilyChange {
                    family,
                    platform,
                    added,
                    removed,
                });
            }
        }
        changes
    }

    /// Remove registered entities of this pair whose resource is neither
    /// detected nor still known. `None` when the registry could not be read.
    async fn sweep_orphans(&self, index: usize, detected: &BTreeSet<String>) -> Option<Vec<String>> {
        let family = self.trackers[index].family();
        let platform = self.trackers[index].platform();

        let registered = match self.registry.entities(&self.entry_id).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!("Orphan sweep for {} skipped: {}", family, e);
                return None;
            }
        };
        let orphans: BTreeSet<String> = registered
            .into_iter()
            .filter(|e| e.key.family == family && e.key.platform == platform)
            .map(|e| e.key.resource_id)
            .filter(|id| !detected.contains(id) && !self.trackers[index].known().contains(id))
            .collect();

        for id in &orphans {
            info!("Removing orphaned {} {} entities for {}", family, platform, id);
            self.retire(family, platform, id).await;
        }
        Some(orphans.into_iter().collect())
    }

    /// Remove one resource's entities on `platform`, clear its retained
    /// topics and drop its device once no entity references it.
    async fn retire(&self, family: ResourceFamily, platform: EntityPlatform, resource_id: &str) {
        for metric in family.metrics(platform, resource_id) {
            let key = EntityKey::new(&self.entry_id, family, resource_id, platform, metric);
            if let Err(e) = self.registry.remove(&key).await {
                warn!("Failed to remove {}: {}", key.unique_id(), e);
            }
        }

        if platform == EntityPlatform::Sensor {
            let topics = family.retained_topics(&self.root, resource_id);
            if !topics.is_empty() {
                let cleared = publish_tombstones(self.bus.as_ref(), &topics).await;
                debug!("Cleared {}/{} retained topics for {} {}", cleared, topics.len(), family, resource_id);
            }
        }

        if !family.has_device() {
            return;
        }
        let still_used = match self.registry.entities(&self.entry_id).await {
            Ok(entities) => entities
                .iter()
                .any(|e| e.key.family == family && e.key.resource_id == resource_id),
            Err(e) => {
                warn!("Keeping device for {} {}: {}", family, resource_id, e);
                true
            }
        };
        if !still_used {
            let device = DeviceKey {
                entry_id: self.entry_id.clone(),
                family,
                resource_id: resource_id.to_string(),
            };
            match self.registry.remove_device(&device).await {
                Ok(true) => debug!("Removed device {}", device.identifier()),
                Ok(false) => {}
                Err(e) => warn!("Failed to remove device {}: {}", device.identifier(), e),
            }
        }
    }

    /// Forget all known ids, e.g. after the platforms were torn down
    pub fn reset(&mut self) {
        for tracker in &mut self.trackers {
            tracker.clear();
        }
        self.swept.fill(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MemoryBus;
    use crate::registry::{MemoryRegistry, RegistrySink};
    use crate::telemetry::TelemetryParser;

    struct Harness {
        parser: TelemetryParser,
        registry: Arc<MemoryRegistry>,
        bus: Arc<MemoryBus>,
        slots: DiscoverySlots,
        discovery: Discovery,
    }

    fn harness() -> Harness {
        let parser = TelemetryParser::new("E1");
        let registry = Arc::new(MemoryRegistry::new());
        let bus = Arc::new(MemoryBus::new());
        let slots = DiscoverySlots::all(Arc::new(RegistrySink::new(registry.clone())));
        let discovery = Discovery::new("E1", parser.root(), DeviceModel::UnasPro, registry.clone(), bus.clone());
        Harness {
            parser,
            registry,
            bus,
            slots,
            discovery,
        }
    }

    impl Harness {
        fn send(&self, topic: &str, payload: &str) {
            self.parser.on_message(&format!("unas/E1/{}", topic), payload.as_bytes());
        }

        async fn pass(&mut self, tasks: Option<&[BackupTask]>) -> Vec<FamilyChange> {
            let snapshot = self.parser.snapshot();
            let input = DiscoveryInput {
                snapshot: &snapshot,
                backup_tasks: tasks,
                now: Instant::now(),
            };
            self.discovery.reconcile(&input, &self.slots).await
        }
    }

    #[tokio::test]
    async fn pools_are_registered_then_tombstoned() {
        let mut h = harness();
        h.send("pool/2/usage", "40.0");
        h.send("pool/3/usage", "10.0");
        h.pass(None).await;
        assert!(h.registry.contains_unique_id("E1_unas_pool3_size"));

        // Pool 3 disappears, pool 1 shows up
        let fresh = TelemetryParser::new("E1");
        for (topic, payload) in [("pool/1/usage", "1.0"), ("pool/2/usage", "40.0")] {
            fresh.on_message(&format!("unas/E1/{}", topic), payload.as_bytes());
        }
        let snapshot = fresh.snapshot();
        let input = DiscoveryInput {
            snapshot: &snapshot,
            backup_tasks: None,
            now: Instant::now(),
        };
        let changes = h.discovery.reconcile(&input, &h.slots).await;

        assert_eq!(
            changes,
            vec![FamilyChange {
                family: ResourceFamily::StoragePool,
                platform: EntityPlatform::Sensor,
                added: vec!["1".to_string()],
                removed: vec!["3".to_string()],
            }]
        );
        assert!(!h.registry.contains_unique_id("E1_unas_pool3_usage"));
        assert!(h.registry.contains_unique_id("E1_unas_pool1_usage"));
        assert_eq!(
            h.discovery.known(ResourceFamily::StoragePool, EntityPlatform::Sensor),
            BTreeSet::from(["1".to_string(), "2".to_string()])
        );
        let tombstone = h.bus.published_to("unas/E1/pool/3/usage");
        assert_eq!(tombstone.len(), 1);
        assert!(tombstone[0].payload.is_empty() && tombstone[0].retain);
    }

    #[tokio::test]
    async fn platforms_without_a_sink_are_skipped() {
        let mut h = harness();
        h.slots.detach_all();
        h.send("hdd/1/temperature", "30");
        assert!(h.pass(None).await.is_empty());
        assert!(h.discovery.known(ResourceFamily::DriveBay, EntityPlatform::Sensor).is_empty());
    }

    #[tokio::test]
    async fn orphans_left_by_a_crash_are_swept() {
        let mut h = harness();
        for entity in EntityDescriptor::full_set("E1", ResourceFamily::DriveBay, "7", EntityPlatform::Sensor) {
            h.registry.register(&entity).await.unwrap();
        }
        h.send("hdd/1/temperature", "30");

        let changes = h.pass(None).await;
        assert_eq!(changes[0].removed, vec!["7".to_string()]);
        assert!(!h.registry.contains_unique_id("E1_unas_hdd_7_temperature"));
        assert!(!h.registry.has_device("E1_hdd_7"));
        assert_eq!(h.bus.published_to("unas/E1/hdd/7/bad_sectors").len(), 1);
    }

    #[tokio::test]
    async fn orphan_sweep_runs_once_per_pair() {
        let mut h = harness();
        h.send("hdd/1/temperature", "30");
        h.pass(None).await;

        for entity in EntityDescriptor::full_set("E1", ResourceFamily::DriveBay, "7", EntityPlatform::Sensor) {
            h.registry.register(&entity).await.unwrap();
        }
        assert!(h.pass(None).await.is_empty());
        assert!(h.registry.contains_unique_id("E1_unas_hdd_7_temperature"));

        // After a reset the next pass sweeps again
        h.discovery.reset();
        h.pass(None).await;
        assert!(!h.registry.contains_unique_id("E1_unas_hdd_7_temperature"));
    }

    #[tokio::test]
    async fn empty_telemetry_keeps_persisted_entities() {
        let mut h = harness();
        for entity in EntityDescriptor::full_set("E1", ResourceFamily::DriveBay, "2", EntityPlatform::Sensor) {
            h.registry.register(&entity).await.unwrap();
        }
        assert!(h.pass(None).await.is_empty());
        assert!(h.registry.contains_unique_id("E1_unas_hdd_2_model"));
    }

    #[tokio::test]
    async fn backup_tasks_materialise_on_three_platforms() {
        let mut h = harness();
        let task: BackupTask = serde_json::from_value(serde_json::json!({"id": "t1", "name": "Docs"})).unwrap();
        h.pass(Some(std::slice::from_ref(&task))).await;

        assert!(h.registry.contains_unique_id("E1_backup_t1_last_run_status"));
        assert!(h.registry.contains_unique_id("E1_backup_t1_run_now"));
        assert!(h.registry.contains_unique_id("E1_backup_t1_schedule_enabled"));
        assert!(h.registry.has_device("E1_backup_t1"));

        // A failed fetch changes nothing, an empty list retires the task
        assert!(h.pass(None).await.is_empty());
        assert_eq!(h.pass(Some(&[][..])).await.len(), 3);
        assert!(!h.registry.contains_unique_id("E1_backup_t1_schedule_enabled"));
        assert!(!h.registry.has_device("E1_backup_t1"));
        assert!(h.bus.published().is_empty());
    }
}
