use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{under_root, MessageBus, MessageHandler};
use crate::errors::MessagingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// In-process loopback bus with broker-like retained message semantics.
///
/// Publishes are recorded and delivered synchronously to matching handlers.
/// A new subscriber receives the retained messages under its root, and an
/// empty retained publish clears the retained slot.
pub struct MemoryBus {
    present: AtomicBool,
    handlers: Mutex<HashMap<String, Arc<dyn MessageHandler>>>,
    retained: Mutex<BTreeMap<String, String>>,
    published: Mutex<Vec<PublishedMessage>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self {
            present: AtomicBool::new(true),
            handlers: Mutex::new(HashMap::new()),
            retained: Mutex::new(BTreeMap::new()),
            published: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn retained(&self, topic: &str) -> Option<String> {
        self.retained.lock().get(topic).cloned()
    }

    pub fn is_subscribed(&self, root: &str) -> bool {
        self.handlers.lock().contains_key(root)
    }

    /// Deliver a message as if another client had published it
    pub fn inject(&self, topic: &str, payload: &str, retain: bool) {
        if retain {
            let mut retained = self.retained.lock();
            if payload.is_empty() {
                retained.remove(topic);
            } else {
                retained.insert(topic.to_string(), payload.to_string());
            }
        }
        let targets: Vec<Arc<dyn MessageHandler>> = self
            .handlers
            .lock()
            .iter()
            .filter(|(root, _)| under_root(topic, root))
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in targets {
            handler.on_message(topic, payload.as_bytes());
        }
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), MessagingError> {
        if !self.is_present() {
            return Err(MessagingError::Unavailable);
        }
        self.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        });
        self.inject(topic, payload, retain);
        Ok(())
    }

    async fn subscribe(&self, root: &str, handler: Arc<dyn MessageHandler>) -> Result<(), MessagingError> {
        if !self.is_present() {
            return Err(MessagingError::Unavailable);
        }
        self.handlers.lock().insert(root.to_string(), handler.clone());

        let replay: Vec<(String, String)> = self
            .retained
            .lock()
            .iter()
            .filter(|(topic, _)| under_root(topic, root))
            .map(|(topic, payload)| (topic.clone(), payload.clone()))
            .collect();
        for (topic, payload) in replay {
            handler.on_message(&topic, payload.as_bytes());
        }
        Ok(())
    }

    async fn unsubscribe(&self, root: &str) -> Result<(), MessagingError> {
        self.handlers.lock().remove(root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{TelemetryParser, TelemetryValue};

    #[tokio::test]
    async fn late_subscriber_sees_retained_but_not_cleared_topics() {
        let bus = MemoryBus::new();
        bus.publish("unas/E1/hdd/1/temperature", "35", true).await.unwrap();
        bus.publish("unas/E1/hdd/2/temperature", "36", true).await.unwrap();
        bus.publish("unas/E1/hdd/2/temperature", "", true).await.unwrap();

        let parser = Arc::new(TelemetryParser::new("E1"));
        bus.subscribe(parser.root(), parser.clone()).await.unwrap();

        let snapshot = parser.snapshot();
        assert_eq!(snapshot.get("unas_hdd_1_temperature"), Some(&TelemetryValue::Int(35)));
        assert!(!snapshot.contains("unas_hdd_2_temperature"));
    }

    #[tokio::test]
    async fn absent_bus_rejects_traffic() {
        let bus = MemoryBus::new();
        bus.set_present(false);
        assert!(matches!(
            bus.publish("unas/x/control/monitor_interval", "30", true).await,
            Err(MessagingError::Unavailable)
        ));
    }
}
