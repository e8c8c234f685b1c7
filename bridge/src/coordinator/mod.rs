//! Polling coordinator.
//!
//! Interval ticks, debounced telemetry notifications and explicit requests all
//! converge on [`Coordinator::refresh`], which is single-flight: a trigger
//! that arrives while a cycle is running waits for that cycle and returns its
//! result instead of starting another one. Once closed, no further cycle
//! starts and [`Coordinator::close`] returns only after the running one ended.

pub mod data;

pub use data::CoordinatorData;

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::best_effort::{best_effort, Severity};
use crate::config::DeviceModel;
use crate::constants::{discovery as discovery_timing, remote};
use crate::deploy::Deployer;
use crate::discovery::{Discovery, DiscoveryInput, FamilyChange};
use crate::errors::{BridgeError, MessagingError};
use crate::messaging::MessageBus;
use crate::registry::DiscoverySlots;
use crate::services::{Issue, IssueReporter};
use crate::ssh::{operations, BackupApi, BackupTask, RemoteShell};
use crate::telemetry::TelemetryParser;

/// Collaborators of one installation's coordinator
pub struct CoordinatorParts {
    pub entry_id: String,
    pub model: DeviceModel,
    pub interval: Duration,
    pub shell: Arc<dyn RemoteShell>,
    pub parser: Arc<TelemetryParser>,
    pub bus: Arc<dyn MessageBus>,
    pub deployer: Deployer,
    pub reporter: Arc<dyn IssueReporter>,
    pub discovery: Discovery,
}

pub struct Coordinator {
    entry_id: String,
    model: DeviceModel,
    interval: Duration,
    shell: Arc<dyn RemoteShell>,
    parser: Arc<TelemetryParser>,
    bus: Arc<dyn MessageBus>,
    deployer: Deployer,
    backup_api: BackupApi,
    reporter: Arc<dyn IssueReporter>,
    discovery: Mutex<Discovery>,
    slots: DiscoverySlots,
    data: RwLock<Option<Arc<CoordinatorData>>>,
    refresh_gate: Mutex<()>,
    messaging_missing: AtomicBool,
    closed: AtomicBool,
}

impl Coordinator {
    pub fn new(parts: CoordinatorParts) -> Arc<Self> {
        let backup_api = BackupApi::new(parts.shell.clone());
        Arc::new(Self {
            entry_id: parts.entry_id,
            model: parts.model,
            interval: parts.interval,
            shell: parts.shell,
            parser: parts.parser,
            bus: parts.bus,
            deployer: parts.deployer,
            backup_api,
            reporter: parts.reporter,
            discovery: Mutex::new(parts.discovery),
            slots: DiscoverySlots::new(),
            data: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            messaging_missing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    pub fn root(&self) -> &str {
        self.parser.root()
    }

    pub fn parser(&self) -> &Arc<TelemetryParser> {
        &self.parser
    }

    pub fn shell(&self) -> &Arc<dyn RemoteShell> {
        &self.shell
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    pub fn backup_api(&self) -> &BackupApi {
        &self.backup_api
    }

    /// Registration slots the presentation platforms fill in once ready
    pub fn slots(&self) -> &DiscoverySlots {
        &self.slots
    }

    /// Latest composite snapshot, if a cycle has completed
    pub fn data(&self) -> Option<Arc<CoordinatorData>> {
        self.data.read().clone()
    }

    pub fn backup_task(&self, task_id: &str) -> Option<BackupTask> {
        self.data()?
            .backup_tasks
            .iter()
            .find(|task| task.id == task_id)
            .cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Refuse new cycles and wait for the one in flight, if any
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _gate = self.refresh_gate.lock().await;
        debug!("Coordinator for {} closed", self.entry_id);
    }

    /// Run a cycle, or join the one already in flight
    pub async fn refresh(&self) -> Result<Arc<CoordinatorData>, BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::Unloaded);
        }
        if let Ok(_gate) = self.refresh_gate.try_lock() {
            return self.run_cycle().await;
        }

        debug!("Refresh already running for {}, joining it", self.entry_id);
        let _gate = self.refresh_gate.lock().await;
        if self.messaging_missing.load(Ordering::SeqCst) {
            return Err(MessagingError::Unavailable.into());
        }
        self.data()
            .ok_or_else(|| BridgeError::Other("refresh produced no data".to_string()))
    }

    /// Fire-and-forget refresh used by the debouncer and control actions
    pub fn request_refresh(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = coordinator.refresh().await {
                debug!("Requested refresh for {} failed: {}", coordinator.entry_id, e);
            }
        });
    }

    /// Debouncer callback holding only a weak reference, so a late timer
    /// cannot keep a torn-down coordinator alive
    pub fn refresh_trigger(self: &Arc<Self>) -> crate::telemetry::debounce::RefreshCallback {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.request_refresh();
            }
        })
    }

    async fn run_cycle(&self) -> Result<Arc<CoordinatorData>, BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::Unloaded);
        }
        if !self.bus.is_present() {
            self.messaging_missing.store(true, Ordering::SeqCst);
            error!("MQTT integration not available for {}", self.entry_id);
            self.reporter.raise(&self.entry_id, &Issue::mqtt_missing()).await;
            return Err(MessagingError::Unavailable.into());
        }
        if self.messaging_missing.swap(false, Ordering::SeqCst) {
            self.reporter.resolve(&self.entry_id, "mqtt_missing").await;
        }

        let (data, fresh_tasks) = match self.collect().await {
            Ok((data, tasks)) => (data, tasks),
            Err(e) => {
                warn!("Update failed for {}, keeping last known state: {}", self.entry_id, e);
                (self.degraded(&e), None)
            }
        };
        let data = Arc::new(data);
        *self.data.write() = Some(Arc::clone(&data));

        if self.slots.any_attached() && !self.is_closed() {
            self.discover(fresh_tasks.as_deref()).await;
        }
        Ok(data)
    }

    async fn collect(&self) -> Result<(CoordinatorData, Option<Vec<BackupTask>>), BridgeError> {
        let outcome = self
            .deployer
            .ensure_scripts(&self.entry_id, self.model, self.parser.root())
            .await?;
        debug!("Scripts check for {}: {:?}", self.entry_id, outcome);

        let monitor_running = operations::service_running(self.shell.as_ref(), remote::MONITOR_SERVICE).await?;
        let fan_control_running = operations::service_running(self.shell.as_ref(), remote::FAN_SERVICE).await?;

        let tasks = best_effort("backup task fetch", Severity::Debug, self.backup_api.list_tasks()).await;

        let data = CoordinatorData {
            scripts_installed: true,
            ssh_connected: true,
            monitor_running,
            fan_control_running,
            available: self.parser.is_available(),
            telemetry: self.parser.snapshot(),
            backup_tasks: tasks.clone().unwrap_or_default(),
            last_error: None,
            updated_at: Utc::now(),
        };
        Ok((data, tasks))
    }

    /// Previous state with the session flag cleared and telemetry refreshed
    fn degraded(&self, error: &BridgeError) -> CoordinatorData {
        let previous = self.data();
        CoordinatorData {
            scripts_installed: previous.as_ref().is_some_and(|d| d.scripts_installed),
            ssh_connected: false,
            monitor_running: previous.as_ref().is_some_and(|d| d.monitor_running),
            fan_control_running: previous.as_ref().is_some_and(|d| d.fan_control_running),
            available: self.parser.is_available(),
            telemetry: self.parser.snapshot(),
            backup_tasks: previous.map(|d| d.backup_tasks.clone()).unwrap_or_default(),
            last_error: Some(error.to_string()),
            updated_at: Utc::now(),
        }
    }

    /// One discovery pass over the current snapshot
    pub async fn discover(&self, backup_tasks: Option<&[BackupTask]>) -> Vec<FamilyChange> {
        let snapshot = self.parser.snapshot();
        let input = DiscoveryInput {
            snapshot: &snapshot,
            backup_tasks,
            now: Instant::now(),
        };
        self.discovery.lock().await.reconcile(&input, &self.slots).await
    }

    /// Discovery run right after the platforms attach. The daemons may not
    /// have published yet, so retry until a bay, NVMe slot or pool shows up.
    pub async fn initial_discovery(&self) -> bool {
        // A full cycle covers backup tasks too, now that the sinks are attached
        if let Err(e) = self.refresh().await {
            debug!("Refresh before discovery failed for {}: {}", self.entry_id, e);
        }
        for attempt in 0..=discovery_timing::INITIAL_ATTEMPTS {
            if attempt > 0 {
                sleep(discovery_timing::INITIAL_RETRY_DELAY).await;
            }
            self.discover(None).await;
            if self.discovery.lock().await.has_storage_resources() {
                if attempt > 0 {
                    info!("Storage resources for {} found after {} retries", self.entry_id, attempt);
                }
                return true;
            }
            debug!("No storage resources yet for {} (attempt {})", self.entry_id, attempt + 1);
        }
        warn!(
            "No drives or pools detected for {} after {} attempts",
            self.entry_id,
            discovery_timing::INITIAL_ATTEMPTS
        );
        false
    }

    pub async fn reset_discovery(&self) {
        self.discovery.lock().await.reset();
    }

    pub fn spawn_initial_discovery(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.initial_discovery().await;
        })
    }

    /// Interval-driven refresh loop. The first tick is skipped because setup
    /// performs the first refresh itself.
    pub fn spawn_polling(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(coordinator.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = coordinator.refresh().await {
                    debug!("Scheduled refresh for {} failed: {}", coordinator.entry_id, e);
                }
            }
        })
    }
}
