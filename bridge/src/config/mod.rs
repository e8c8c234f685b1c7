pub mod manager;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::constants::{mqtt, polling, ssh};
use crate::errors::ConfigError;

pub use manager::ConfigManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    #[serde(default)]
    pub alarm_webhook_url: String,
    pub mqtt: MqttConfig,
    // Populated from individual appliance config files
    #[serde(skip)]
    pub appliances: HashMap<String, ApplianceConfig>,
}

fn default_database_path() -> String {
    "data/unas-bridge.db".to_string()
}

fn default_scripts_dir() -> String {
    "bridge/scripts".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Broker address as seen from the appliance, if it differs from `host`
    pub remote_host: Option<String>,
}

fn default_mqtt_port() -> u16 {
    mqtt::DEFAULT_PORT
}

impl MqttConfig {
    pub fn advertised_host(&self) -> &str {
        self.remote_host.as_deref().unwrap_or(&self.host)
    }

    /// Credentials handed to the appliance daemons, if all are present
    pub fn daemon_credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !self.host.is_empty() => {
                Some((user, pass))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplianceConfigFile {
    pub appliance: ApplianceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplianceConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    pub password: Option<String>,
    pub ssh_key_path: Option<String>,
    #[serde(default)]
    pub device_model: DeviceModel,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_seconds: u64,
}

fn default_ssh_port() -> u16 {
    ssh::DEFAULT_PORT
}

fn default_username() -> String {
    "root".to_string()
}

fn default_scan_interval() -> u64 {
    polling::DEFAULT_INTERVAL_SECONDS
}

/// Appliance hardware variants the daemons know how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceModel {
    #[default]
    UnasPro,
    #[serde(rename = "UNAS_PRO_8")]
    UnasPro8,
    #[serde(rename = "UNAS_PRO_4")]
    UnasPro4,
    #[serde(rename = "UNAS_4")]
    Unas4,
    #[serde(rename = "UNAS_2")]
    Unas2,
    Unvr,
}

impl DeviceModel {
    /// Identifier substituted into the monitor script
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceModel::UnasPro => "UNAS_PRO",
            DeviceModel::UnasPro8 => "UNAS_PRO_8",
            DeviceModel::UnasPro4 => "UNAS_PRO_4",
            DeviceModel::Unas4 => "UNAS_4",
            DeviceModel::Unas2 => "UNAS_2",
            DeviceModel::Unvr => "UNVR",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DeviceModel::UnasPro => "UNAS Pro",
            DeviceModel::UnasPro8 => "UNAS Pro 8",
            DeviceModel::UnasPro4 => "UNAS Pro 4",
            DeviceModel::Unas4 => "UNAS 4",
            DeviceModel::Unas2 => "UNAS 2",
            DeviceModel::Unvr => "UNVR",
        }
    }

    /// NVR units run no file-sharing services
    pub fn has_network_shares(&self) -> bool {
        !matches!(self, DeviceModel::Unvr)
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn validate_interval(seconds: u64) -> Result<(), ConfigError> {
    if !(polling::MIN_INTERVAL_SECONDS..=polling::MAX_INTERVAL_SECONDS).contains(&seconds) {
        return Err(ConfigError::InvalidValue {
            field: "scan_interval_seconds".to_string(),
            reason: format!(
                "{} is outside {}..={}",
                seconds,
                polling::MIN_INTERVAL_SECONDS,
                polling::MAX_INTERVAL_SECONDS
            ),
        });
    }
    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.mqtt.host.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            field: "mqtt.host".to_string(),
        });
    }

    for (name, appliance) in &config.appliances {
        if appliance.host.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: format!("{}.host", name),
            });
        }

        validate_interval(appliance.scan_interval_seconds).map_err(|e| match e {
            ConfigError::InvalidValue { reason, .. } => ConfigError::InvalidValue {
                field: format!("{}.scan_interval_seconds", name),
                reason,
            },
            other => other,
        })?;

        if crate::ssh::resolve_credentials(appliance).is_err() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.password", name),
                reason: "no password configured and no SSH key file found".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appliance(interval: u64) -> ApplianceConfig {
        ApplianceConfig {
            host: "10.0.0.5".to_string(),
            port: 22,
            username: "root".to_string(),
            password: Some("secret".to_string()),
            ssh_key_path: None,
            device_model: DeviceModel::UnasPro,
            scan_interval_seconds: interval,
        }
    }

    fn config_with(appliance: ApplianceConfig) -> Config {
        let mut appliances = HashMap::new();
        appliances.insert("office".to_string(), appliance);
        Config {
            host: "127.0.0.1".to_string(),
            port: 8095,
            database_path: "data/test.db".to_string(),
            scripts_dir: "scripts".to_string(),
            alarm_webhook_url: String::new(),
            mqtt: MqttConfig {
                host: "broker.local".to_string(),
                port: 1883,
                username: Some("unas".to_string()),
                password: Some("pw".to_string()),
                remote_host: None,
            },
            appliances,
        }
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        assert!(validate_interval(5).is_ok());
        assert!(validate_interval(60).is_ok());
        assert!(validate_interval(4).is_err());
        assert!(validate_interval(61).is_err());
    }

    #[test]
    fn rejects_out_of_range_scan_interval() {
        let err = validate_config(&config_with(appliance(90))).unwrap_err();
        assert!(err.to_string().contains("office.scan_interval_seconds"));
    }

    #[test]
    fn accepts_password_appliance() {
        assert!(validate_config(&config_with(appliance(30))).is_ok());
    }

    #[test]
    fn device_model_round_trips_through_toml_names() {
        let parsed: ApplianceConfigFile = toml::from_str(
            r#"
[appliance]
host = "10.0.0.9"
password = "x"
device_model = "UNAS_PRO_8"
"#,
        )
        .unwrap();
        assert_eq!(parsed.appliance.device_model, DeviceModel::UnasPro8);
        assert_eq!(parsed.appliance.port, 22);
        assert_eq!(parsed.appliance.username, "root");
        assert_eq!(parsed.appliance.scan_interval_seconds, 30);
        assert!(!DeviceModel::Unvr.has_network_shares());
    }

    #[test]
    fn daemon_credentials_require_user_and_password() {
        let mut mqtt = config_with(appliance(30)).mqtt;
        assert_eq!(mqtt.daemon_credentials(), Some(("unas", "pw")));
        assert_eq!(mqtt.advertised_host(), "broker.local");
        mqtt.password = None;
        assert_eq!(mqtt.daemon_credentials(), None);
        mqtt.remote_host = Some("192.168.1.2".to_string());
        assert_eq!(mqtt.advertised_host(), "192.168.1.2");
    }
}
