//! Custom error types for the UNAS bridge
//!
//! Only messaging absence and deployment failures are meant to travel past a
//! component boundary; everything else is absorbed where it happens. Setup
//! errors carry a stable code that callers can show to the user.

use std::fmt;

/// Main error type for the bridge
#[derive(Debug)]
pub enum BridgeError {
    Config(ConfigError),

    /// Remote shell failures
    Session(SessionError),

    /// Script deployment failures
    Deployment(DeploymentError),

    /// Message bus failures
    Messaging(MessagingError),

    /// Entity registry failures
    Registry(RegistryError),

    /// Rejected control requests
    Control(ControlError),

    /// The installation was unloaded
    Unloaded,

    /// Other errors with context
    Other(String),
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { field: String, reason: String },
    MissingRequired { field: String },
}

#[derive(Debug)]
pub enum SessionError {
    /// Connection attempt did not finish in time
    ConnectTimeout { host: String, seconds: u64 },

    /// Connection failed before authentication
    ConnectFailed { host: String, reason: String },

    /// The appliance rejected the password or key
    AuthRejected { host: String },

    /// Neither a password nor any key file is available
    NoCredentials { host: String },

    /// Command could not be executed on an established session
    CommandFailed { host: String, reason: String },
}

#[derive(Debug)]
pub enum DeploymentError {
    /// A local template could not be read
    TemplateRead { path: String, reason: String },

    /// A rendered file could not be written to the appliance
    Upload { path: String, reason: String },

    /// An install step exited non-zero
    StepFailed {
        step: String,
        exit_status: u32,
        stderr: String,
    },

    Session(SessionError),
}

#[derive(Debug)]
pub enum MessagingError {
    /// The bus has been shut down or was never started
    Unavailable,

    PublishFailed { topic: String, reason: String },

    SubscribeFailed { topic: String, reason: String },
}

#[derive(Debug)]
pub enum RegistryError {
    Storage { reason: String },
}

#[derive(Debug)]
pub enum ControlError {
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    /// The requested value would leave the fan curve inverted
    InvalidCurve { reason: String },

    UnknownTask { task_id: String },

    /// The appliance refused or failed the action
    Rejected { action: String, reason: String },
}

/// Errors raised while validating a new appliance before it is installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    Timeout,
    CannotConnect,
    InvalidAuth,
    NoCredentials,
    MqttCannotConnect,
    MqttInvalidAuth,
    MqttTimeout,
    Unknown(String),
}

impl SetupError {
    /// Stable identifier shown to the user
    pub fn code(&self) -> &'static str {
        match self {
            SetupError::Timeout => "timeout_connect",
            SetupError::CannotConnect => "cannot_connect",
            SetupError::InvalidAuth => "invalid_auth",
            SetupError::NoCredentials => "no_credentials",
            SetupError::MqttCannotConnect => "mqtt_cannot_connect",
            SetupError::MqttInvalidAuth => "mqtt_invalid_auth",
            SetupError::MqttTimeout => "mqtt_timeout",
            SetupError::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Config(e) => write!(f, "Configuration error: {}", e),
            BridgeError::Session(e) => write!(f, "Session error: {}", e),
            BridgeError::Deployment(e) => write!(f, "Deployment error: {}", e),
            BridgeError::Messaging(e) => write!(f, "Messaging error: {}", e),
            BridgeError::Registry(e) => write!(f, "Registry error: {}", e),
            BridgeError::Control(e) => write!(f, "Control error: {}", e),
            BridgeError::Unloaded => write!(f, "Installation has been unloaded"),
            BridgeError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::MissingRequired { field } => {
                write!(f, "Missing required field: {}", field)
            }
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ConnectTimeout { host, seconds } => {
                write!(f, "Connection to {} timed out after {}s", host, seconds)
            }
            SessionError::ConnectFailed { host, reason } => {
                write!(f, "Connection to {} failed: {}", host, reason)
            }
            SessionError::AuthRejected { host } => {
                write!(f, "Authentication to {} was rejected", host)
            }
            SessionError::NoCredentials { host } => {
                write!(f, "No password or SSH key available for {}", host)
            }
            SessionError::CommandFailed { host, reason } => {
                write!(f, "Command on {} failed: {}", host, reason)
            }
        }
    }
}

impl fmt::Display for DeploymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentError::TemplateRead { path, reason } => {
                write!(f, "Failed to read template '{}': {}", path, reason)
            }
            DeploymentError::Upload { path, reason } => {
                write!(f, "Failed to upload '{}': {}", path, reason)
            }
            DeploymentError::StepFailed {
                step,
                exit_status,
                stderr,
            } => {
                write!(
                    f,
                    "Step '{}' exited with status {}: {}",
                    step, exit_status, stderr
                )
            }
            DeploymentError::Session(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for MessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagingError::Unavailable => write!(f, "MQTT integration is not available"),
            MessagingError::PublishFailed { topic, reason } => {
                write!(f, "Publish to '{}' failed: {}", topic, reason)
            }
            MessagingError::SubscribeFailed { topic, reason } => {
                write!(f, "Subscribe to '{}' failed: {}", topic, reason)
            }
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Storage { reason } => write!(f, "Registry storage failed: {}", reason),
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(
                    f,
                    "{} must be between {} and {}, got {}",
                    field, min, max, value
                )
            }
            ControlError::InvalidCurve { reason } => write!(f, "Invalid fan curve: {}", reason),
            ControlError::UnknownTask { task_id } => {
                write!(f, "Backup task '{}' not found", task_id)
            }
            ControlError::Rejected { action, reason } => {
                write!(f, "{} rejected: {}", action, reason)
            }
        }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Unknown(reason) => write!(f, "{}: {}", self.code(), reason),
            _ => write!(f, "{}", self.code()),
        }
    }
}

impl std::error::Error for BridgeError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for SessionError {}
impl std::error::Error for DeploymentError {}
impl std::error::Error for MessagingError {}
impl std::error::Error for RegistryError {}
impl std::error::Error for ControlError {}
impl std::error::Error for SetupError {}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::Other(err.to_string())
    }
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        BridgeError::Config(err)
    }
}

impl From<SessionError> for BridgeError {
    fn from(err: SessionError) -> Self {
        BridgeError::Session(err)
    }
}

impl From<DeploymentError> for BridgeError {
    fn from(err: DeploymentError) -> Self {
        BridgeError::Deployment(err)
    }
}

impl From<MessagingError> for BridgeError {
    fn from(err: MessagingError) -> Self {
        BridgeError::Messaging(err)
    }
}

impl From<RegistryError> for BridgeError {
    fn from(err: RegistryError) -> Self {
        BridgeError::Registry(err)
    }
}

impl From<ControlError> for BridgeError {
    fn from(err: ControlError) -> Self {
        BridgeError::Control(err)
    }
}

impl From<SessionError> for DeploymentError {
    fn from(err: SessionError) -> Self {
        DeploymentError::Session(err)
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Storage {
            reason: err.to_string(),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
