//! Message bus abstraction over the MQTT broker shared with the appliance.
//!
//! The bus can be absent: the coordinator checks [`MessageBus::is_present`]
//! on every cycle and raises a repair issue instead of polling blind.

pub mod memory;
pub mod mqtt;

pub use memory::MemoryBus;
pub use mqtt::{probe_broker, MqttBus};

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::MessagingError;
use crate::telemetry::TelemetryParser;

/// Receives every message published under a subscribed root
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, topic: &str, payload: &[u8]);
}

impl MessageHandler for TelemetryParser {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        TelemetryParser::on_message(self, topic, payload)
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Whether the messaging integration is currently usable
    fn is_present(&self) -> bool;

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), MessagingError>;

    /// Route everything under `<root>/#` to `handler`, replacing any
    /// previous handler for the same root
    async fn subscribe(&self, root: &str, handler: Arc<dyn MessageHandler>) -> Result<(), MessagingError>;

    async fn unsubscribe(&self, root: &str) -> Result<(), MessagingError>;
}

pub(crate) fn wildcard(root: &str) -> String {
    format!("{}/#", root)
}

/// Whether `topic` lives under `root`, on a level boundary
pub(crate) fn under_root(topic: &str, root: &str) -> bool {
    topic
        .strip_prefix(root)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Publish an empty retained payload to each topic, ignoring failures.
/// Returns how many tombstones were accepted.
pub async fn publish_tombstones(bus: &dyn MessageBus, topics: &[String]) -> usize {
    let mut cleared = 0;
    for topic in topics {
        if crate::best_effort::best_effort(
            &format!("clear retained {}", topic),
            crate::best_effort::Severity::Debug,
            bus.publish(topic, "", true),
        )
        .await
        .is_some()
        {
            cleared += 1;
        }
    }
    cleared
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_matching_respects_level_boundaries() {
        assert!(under_root("unas/abc/system/cpu", "unas/abc"));
        assert!(!under_root("unas/abcd/system/cpu", "unas/abc"));
        assert!(!under_root("unas/abc", "unas/abc"));
        assert_eq!(wildcard("unas/abc"), "unas/abc/#");
    }

    #[tokio::test]
    async fn tombstones_are_empty_and_retained() {
        let bus = MemoryBus::new();
        let topics = vec!["unas/a/hdd/3/temperature".to_string(), "unas/a/hdd/3/model".to_string()];
        assert_eq!(publish_tombstones(&bus, &topics).await, 2);

        let published = bus.published();
        assert_eq!(published.len(), 2);
        assert!(published.iter().all(|m| m.payload.is_empty() && m.retain));
    }
}
