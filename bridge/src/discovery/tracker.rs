use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use crate::constants::discovery::DRIVE_REMOVAL_GRACE;
use crate::registry::{EntityPlatform, ResourceFamily};

/// Outcome of diffing one family's known ids against a fresh detection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Known identifier set of one (family, platform) pair
#[derive(Debug)]
pub struct FamilyTracker {
    family: ResourceFamily,
    platform: EntityPlatform,
    known: BTreeSet<String>,
    missing_since: HashMap<String, Instant>,
    grace: Duration,
}

impl FamilyTracker {
    pub fn new(family: ResourceFamily, platform: EntityPlatform) -> Self {
        let grace = match family {
            ResourceFamily::DriveBay | ResourceFamily::NvmeSlot => DRIVE_REMOVAL_GRACE,
            _ => Duration::ZERO,
        };
        Self::with_grace(family, platform, grace)
    }

    pub fn with_grace(family: ResourceFamily, platform: EntityPlatform, grace: Duration) -> Self {
        Self {
            family,
            platform,
            known: BTreeSet::new(),
            missing_since: HashMap::new(),
            grace,
        }
    }

    pub fn family(&self) -> ResourceFamily {
        self.family
    }

    pub fn platform(&self) -> EntityPlatform {
        self.platform
    }

    pub fn known(&self) -> &BTreeSet<String> {
        &self.known
    }

    /// Diff `detected` against the known set and update it.
    ///
    /// A missing id is removed once it has been undetected for the grace
    /// period; until then it stays known. Both lists come out sorted.
    pub fn plan(&mut self, detected: &BTreeSet<String>, now: Instant) -> ReconcilePlan {
        let added: Vec<String> = detected.difference(&self.known).cloned().collect();

        let mut removed = Vec::new();
        for id in self.known.difference(detected) {
            let since = *self.missing_since.entry(id.clone()).or_insert(now);
            if now.saturating_duration_since(since) >= self.grace {
                removed.push(id.clone());
            }
        }

        self.missing_since
            .retain(|id, _| !detected.contains(id) && !removed.contains(id));
        for id in &removed {
            self.known.remove(id);
        }
        self.known.extend(added.iter().cloned());

        ReconcilePlan { added, removed }
    }

    /// Drop an id whose registration failed so the next pass retries it
    pub fn forget(&mut self, id: &str) {
        self.known.remove(id);
        self.missing_since.remove(id);
    }

    pub fn clear(&mut self) {
        self.known.clear();
        self.missing_since.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn diff_adds_new_and_removes_missing() {
        let mut tracker = FamilyTracker::new(ResourceFamily::StoragePool, EntityPlatform::Sensor);
        let now = Instant::now();
        tracker.plan(&ids(&["2", "3"]), now);

        let plan = tracker.plan(&ids(&["1", "2"]), now);
        assert_eq!(plan.added, vec!["1".to_string()]);
        assert_eq!(plan.removed, vec!["3".to_string()]);
        assert_eq!(tracker.known(), &ids(&["1", "2"]));
    }

    #[tokio::test(start_paused = true)]
    async fn drives_survive_short_gaps() {
        let mut tracker = FamilyTracker::new(ResourceFamily::DriveBay, EntityPlatform::Sensor);
        tracker.plan(&ids(&["1", "2"]), Instant::now());

        let plan = tracker.plan(&ids(&["1"]), Instant::now());
        assert!(plan.removed.is_empty());
        assert!(tracker.known().contains("2"));

        tokio::time::advance(Duration::from_secs(30)).await;
        // Reappearing resets the grace clock
        assert!(tracker.plan(&ids(&["1", "2"]), Instant::now()).is_empty());

        tracker.plan(&ids(&["1"]), Instant::now());
        tokio::time::advance(DRIVE_REMOVAL_GRACE).await;
        let plan = tracker.plan(&ids(&["1"]), Instant::now());
        assert_eq!(plan.removed, vec!["2".to_string()]);
        assert_eq!(tracker.known(), &ids(&["1"]));
    }

    #[tokio::test]
    async fn forgotten_ids_are_added_again() {
        let mut tracker = FamilyTracker::new(ResourceFamily::BackupTask, EntityPlatform::Switch);
        let now = Instant::now();
        tracker.plan(&ids(&["t1"]), now);
        tracker.forget("t1");
        assert_eq!(tracker.plan(&ids(&["t1"]), now).added, vec!["t1".to_string()]);
    }
}
