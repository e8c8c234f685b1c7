//! Placeholder substitution for the daemon templates.
//!
//! The monitor script declares `KEY = "REPLACE_ME"` (Python), the fan script
//! declares `KEY="REPLACE_ME"` (shell). Both forms are rewritten in every file.

use crate::config::DeviceModel;
use crate::ssh::quote;

const PLACEHOLDER: &str = "REPLACE_ME";
const DEFAULT_MODEL_LINE: &str = "DEVICE_MODEL = \"UNAS_PRO\"";

/// Values written into the daemons so they can reach the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub mqtt_host: String,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub mqtt_root: String,
}

impl DaemonSettings {
    fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("MQTT_HOST", self.mqtt_host.as_str()),
            ("MQTT_USER", self.mqtt_user.as_str()),
            ("MQTT_PASS", self.mqtt_pass.as_str()),
            ("MQTT_ROOT", self.mqtt_root.as_str()),
        ]
    }
}

fn python_literal(value: &str) -> String {
    // A JSON string literal is also a valid Python 3 string literal
    serde_json::Value::String(value.to_string()).to_string()
}

pub fn substitute_settings(template: &str, settings: &DaemonSettings) -> String {
    let mut rendered = template.to_string();
    for (key, value) in settings.pairs() {
        rendered = rendered.replace(
            &format!("{} = \"{}\"", key, PLACEHOLDER),
            &format!("{} = {}", key, python_literal(value)),
        );
        rendered = rendered.replace(
            &format!("{}=\"{}\"", key, PLACEHOLDER),
            &format!("{}={}", key, quote(value)),
        );
    }
    rendered
}

pub fn substitute_model(template: &str, model: DeviceModel) -> String {
    template.replace(
        DEFAULT_MODEL_LINE,
        &format!("DEVICE_MODEL = \"{}\"", model.as_str()),
    )
}
