//! Central repository for timing constants, thresholds, and remote paths
//!
//! Constants are grouped by the component that owns them. Values that are part
//! of the contract with the appliance-side daemons live next to each other so a
//! daemon change only touches one place.

use std::time::Duration;

/// Telemetry freshness and refresh coalescing
pub mod telemetry {
    use super::Duration;

    /// Keys older than this are evicted on the next snapshot read
    pub const STALE_AFTER: Duration = Duration::from_secs(120);

    /// Quiet window before a burst of messages triggers one refresh
    pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

    /// Key prefixes that hold desired configuration and never expire
    pub const NON_EXPIRING_PREFIXES: &[&str] = &["fan_curve_", "fan_mode", "monitor_interval"];

    /// Availability payload that forces the appliance offline
    pub const OFFLINE_STATUS: &str = "offline";

    /// Suffix appended to a base key to address its attribute slot
    pub const ATTRIBUTES_SUFFIX: &str = "_attributes";

    /// Number of installation-id characters used for the topic root
    pub const ROOT_ID_CHARS: usize = 8;
}

/// Remote shell timeouts
pub mod ssh {
    use super::Duration;

    pub const DEFAULT_PORT: u16 = 22;

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Liveness probe issued before reusing a cached session
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

    pub const PROBE_COMMAND: &str = "true";

    /// Connectivity check used while validating a new appliance
    pub const SETUP_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

    /// Key files tried in order when no password is configured.
    /// Entries starting with `~/` are resolved against the home directory.
    pub const KEY_SEARCH_PATHS: &[&str] = &[
        "/config/.ssh/id_rsa",
        "/config/.ssh/id_ed25519",
        "~/.ssh/id_rsa",
        "~/.ssh/id_ed25519",
    ];
}

/// Polling coordinator cadence
pub mod polling {
    use super::Duration;

    pub const DEFAULT_INTERVAL_SECONDS: u64 = 30;
    pub const MIN_INTERVAL_SECONDS: u64 = 5;
    pub const MAX_INTERVAL_SECONDS: u64 = 60;

    /// Delay before an installation whose setup failed is tried again
    pub const SETUP_RETRY_DELAY: Duration = Duration::from_secs(60);
}

/// Resource discovery timing
pub mod discovery {
    use super::Duration;

    /// Attempts made while waiting for the first telemetry burst after setup
    pub const INITIAL_ATTEMPTS: u32 = 12;

    pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(5);

    /// A drive must stay undetected this long before its entities are removed
    pub const DRIVE_REMOVAL_GRACE: Duration = Duration::from_secs(60);
}

/// MQTT client settings
pub mod mqtt {
    use super::Duration;

    pub const DEFAULT_PORT: u16 = 1883;
    pub const KEEP_ALIVE: Duration = Duration::from_secs(15);
    pub const CHANNEL_CAPACITY: usize = 64;

    /// Back-off after an event loop error before polling again
    pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

    /// Upper bound on handing one publish to the client queue
    pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

    /// How long startup waits for the first broker connection
    pub const STARTUP_WAIT: Duration = Duration::from_secs(10);

    /// How long setup validation waits for the broker's CONNACK
    pub const SETUP_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

    /// Topic prefix of the legacy auto-discovery configs cleared on upgrade
    pub const LEGACY_DISCOVERY_PREFIX: &str = "homeassistant/sensor";
}

/// Files and services installed on the appliance
pub mod remote {
    pub const MONITOR_SCRIPT: &str = "/root/unas_monitor.py";
    pub const MONITOR_UNIT: &str = "/etc/systemd/system/unas_monitor.service";
    pub const MONITOR_SERVICE: &str = "unas_monitor";

    pub const FAN_SCRIPT: &str = "/root/fan_control.sh";
    pub const FAN_UNIT: &str = "/etc/systemd/system/fan_control.service";
    pub const FAN_SERVICE: &str = "fan_control";

    /// Python client library the monitor imports at runtime
    pub const MQTT_CLIENT_MODULE: &str = "paho.mqtt.client";
    pub const MQTT_CLIENT_PACKAGE: &str = "paho-mqtt==2.1.0";

    /// CLI the fan script uses to receive control messages
    pub const MQTT_CLI_TOOL: &str = "mosquitto_sub";

    /// State and log files the daemons leave behind
    pub const STATE_FILES: &[&str] = &[
        "/tmp/fan_control_last_pwm",
        "/tmp/fan_control_state",
        "/tmp/unas_hdd_temp",
        "/tmp/unas_monitor_interval",
        "/var/log/fan_control.log*",
    ];

    /// Writing 2 to these hands PWM control back to the firmware
    pub const PWM_ENABLE_FILES: &[&str] = &[
        "/sys/class/hwmon/hwmon0/pwm1_enable",
        "/sys/class/hwmon/hwmon0/pwm2_enable",
    ];
}

/// Loopback management API used for remote backup tasks.
///
/// The identity headers match the firmware the daemons were written against
/// and are versioned together with it.
pub mod backup_api {
    pub const BASE_URL: &str = "http://localhost:16080";
    pub const USER_CACHE_FILE: &str = "/data/unifi-core/config/cache/users.json";
    pub const USER_ROLE: &str = "owner";
    pub const ACCESS_MASK: u32 = 114654;
    pub const PERMISSION_MASK: u32 = 16382;

    pub const TASKS_PATH: &str = "/api/v1/remote-backup/tasks";
    pub const RUN_TASK_PATH: &str = "/api/v1/remote-backup/run-task";
}

/// Fan policy defaults used when the daemon has not reported a value yet
pub mod fan {
    pub const DEFAULT_FIXED_PWM: u8 = 128;
    pub const FALLBACK_MIN_TEMP: i64 = 43;
    pub const FALLBACK_MAX_TEMP: i64 = 47;
    pub const FALLBACK_MIN_FAN_PWM: i64 = 204;
    pub const FALLBACK_MAX_FAN_PWM: i64 = 255;

    /// Temperature span rendered by the curve visualisation
    pub const CURVE_PLOT_RANGE: std::ops::RangeInclusive<i64> = 30..=60;
}
