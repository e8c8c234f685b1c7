use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions, QoS,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{under_root, wildcard, MessageBus, MessageHandler};
use crate::config::MqttConfig;
use crate::constants::mqtt;
use crate::errors::{MessagingError, SetupError};

type HandlerMap = Arc<RwLock<HashMap<String, Arc<dyn MessageHandler>>>>;

fn options(config: &MqttConfig, client_id: String) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id, config.host.clone(), config.port);
    opts.set_keep_alive(mqtt::KEEP_ALIVE);
    if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
        opts.set_credentials(username, config.password.clone().unwrap_or_default());
    }
    opts
}

/// Message bus backed by a shared MQTT broker connection
pub struct MqttBus {
    client: AsyncClient,
    handlers: HandlerMap,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBus {
    /// Connect in the background. Publishes and subscriptions issued before
    /// the first CONNACK are queued or replayed once connected.
    pub fn start(config: &MqttConfig) -> Arc<Self> {
        let client_id = format!("unas-bridge-{}", Uuid::new_v4().simple());
        let (client, eventloop) = AsyncClient::new(options(config, client_id), mqtt::CHANNEL_CAPACITY);

        let handlers: HandlerMap = Arc::new(RwLock::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            handlers.clone(),
            connected.clone(),
        ));

        info!("MQTT client started for {}:{}", config.host, config.port);
        Arc::new(Self {
            client,
            handlers,
            connected,
            closed: AtomicBool::new(false),
            event_loop: Mutex::new(Some(task)),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Wait up to `limit` for the first CONNACK
    pub async fn wait_connected(&self, limit: std::time::Duration) -> bool {
        let poll = async {
            while !self.connected.load(Ordering::SeqCst) {
                sleep(std::time::Duration::from_millis(100)).await;
            }
        };
        timeout(limit, poll).await.is_ok()
    }

    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect failed: {}", e);
        }
        if let Some(task) = self.event_loop.lock().take() {
            task.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("MQTT client stopped");
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    handlers: HandlerMap,
    connected: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                let roots: Vec<String> = handlers.read().keys().cloned().collect();
                info!("MQTT connected, restoring {} subscriptions", roots.len());
                // try_subscribe: awaiting here would block the loop that drains the queue
                for root in roots {
                    if let Err(e) = client.try_subscribe(wildcard(&root), QoS::AtMostOnce) {
                        warn!("Resubscribe to {} failed: {}", root, e);
                    }
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                dispatch(&handlers, &publish.topic, &publish.payload);
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    error!("MQTT connection lost: {}", e);
                } else {
                    debug!("MQTT connection error: {}", e);
                }
                sleep(mqtt::RECONNECT_DELAY).await;
            }
        }
    }
}

fn dispatch(handlers: &HandlerMap, topic: &str, payload: &[u8]) {
    let targets: Vec<Arc<dyn MessageHandler>> = handlers
        .read()
        .iter()
        .filter(|(root, _)| under_root(topic, root))
        .map(|(_, handler)| handler.clone())
        .collect();
    for handler in targets {
        handler.on_message(topic, payload);
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    fn is_present(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), MessagingError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::Unavailable);
        }
        let send = self
            .client
            .publish(topic, QoS::AtMostOnce, retain, payload.as_bytes().to_vec());
        match timeout(mqtt::PUBLISH_TIMEOUT, send).await {
            Ok(Ok(())) => {
                debug!("Published {} (retain: {})", topic, retain);
                Ok(())
            }
            Ok(Err(e)) => Err(MessagingError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(MessagingError::PublishFailed {
                topic: topic.to_string(),
                reason: "client queue full".to_string(),
            }),
        }
    }

    async fn subscribe(&self, root: &str, handler: Arc<dyn MessageHandler>) -> Result<(), MessagingError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::Unavailable);
        }
        self.handlers.write().insert(root.to_string(), handler);
        if !self.connected.load(Ordering::SeqCst) {
            debug!("Subscription to {} deferred until connected", root);
            return Ok(());
        }
        self.client
            .subscribe(wildcard(root), QoS::AtMostOnce)
            .await
            .map_err(|e| MessagingError::SubscribeFailed {
                topic: wildcard(root),
                reason: e.to_string(),
            })
    }

    async fn unsubscribe(&self, root: &str) -> Result<(), MessagingError> {
        self.handlers.write().remove(root);
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.client
            .unsubscribe(wildcard(root))
            .await
            .map_err(|e| MessagingError::SubscribeFailed {
                topic: wildcard(root),
                reason: e.to_string(),
            })
    }
}

/// Check that the broker accepts our credentials
pub async fn probe_broker(config: &MqttConfig) -> Result<(), SetupError> {
    let client_id = format!("unas-bridge-check-{}", Uuid::new_v4().simple());
    let (client, mut eventloop) = AsyncClient::new(options(config, client_id), 10);

    let handshake = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => return Ok(()),
                Ok(_) => continue,
                Err(e) => return Err(e),
            }
        }
    };
    let result = timeout(mqtt::SETUP_CHECK_TIMEOUT, handshake).await;
    if let Err(e) = client.try_disconnect() {
        debug!("MQTT probe disconnect failed: {}", e);
    }

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized,
        ))) => Err(SetupError::MqttInvalidAuth),
        Ok(Err(e)) => {
            warn!("MQTT broker check failed: {}", e);
            Err(SetupError::MqttCannotConnect)
        }
        Err(_) => Err(SetupError::MqttTimeout),
    }
}
