pub mod best_effort;
pub mod config;
pub mod constants;
pub mod controls;
pub mod coordinator;
pub mod database;
pub mod deploy;
pub mod discovery;
pub mod errors;
pub mod installation;
pub mod messaging;
pub mod registry;
pub mod services;
pub mod setup;
pub mod ssh;
pub mod telemetry;
pub mod upgrade;
pub mod web;

// Re-export commonly used types
pub use config::{ApplianceConfig, Config, ConfigManager, DeviceModel, MqttConfig};
pub use coordinator::{Coordinator, CoordinatorData};
pub use database::Database;
pub use errors::{BridgeError, BridgeResult, SetupError};
pub use installation::{Installation, Installations, SharedServices};
pub use messaging::{MessageBus, MqttBus};
pub use services::AlertService;
pub use telemetry::TelemetryParser;
