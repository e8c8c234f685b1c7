//! Builder writing a config directory the way an operator lays it out

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestConfigBuilder {
    temp_dir: TempDir,
    mqtt_username: Option<String>,
    appliances: Vec<(String, String)>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            mqtt_username: Some("unas".to_string()),
            appliances: Vec::new(),
        }
    }

    pub fn without_mqtt_credentials(mut self) -> Self {
        self.mqtt_username = None;
        self
    }

    /// Add an appliance file; `extra` is appended to its `[appliance]` table
    pub fn with_appliance(mut self, name: &str, host: &str, extra: &str) -> Self {
        let body = format!(
            "[appliance]\nhost = \"{}\"\npassword = \"hunter2\"\n{}\n",
            host, extra
        );
        self.appliances.push((name.to_string(), body));
        self
    }

    /// Add an appliance file with arbitrary content
    pub fn with_raw_appliance(mut self, name: &str, body: &str) -> Self {
        self.appliances.push((name.to_string(), body.to_string()));
        self
    }

    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        let credentials = match &self.mqtt_username {
            Some(user) => format!("username = \"{}\"\npassword = \"mqttpass\"\n", user),
            None => String::new(),
        };
        let main = format!(
            "host = \"127.0.0.1\"\nport = 8098\n\
             database_path = \"{}\"\n\
             alarm_webhook_url = \"\"\n\n\
             [mqtt]\nhost = \"192.168.1.10\"\n{}",
            self.temp_dir.path().join("bridge.db").display(),
            credentials
        );
        fs::write(config_dir.join("main.toml"), main).expect("Failed to write main.toml");

        for (name, body) in &self.appliances {
            fs::write(config_dir.join(format!("{}.toml", name)), body)
                .expect("Failed to write appliance config");
        }

        TestConfig {
            config_dir,
            _temp_dir: self.temp_dir,
        }
    }
}

pub struct TestConfig {
    pub config_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestConfig {
    pub fn dir(&self) -> String {
        self.config_dir.display().to_string()
    }
}
