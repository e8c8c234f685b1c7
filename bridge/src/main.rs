use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use unas_bridge::constants::{mqtt, polling};
use unas_bridge::deploy::DaemonCredentials;
use unas_bridge::web::{start_web_server, AppState};
use unas_bridge::{
    setup, AlertService, ApplianceConfig, ConfigManager, Database, Installation, Installations,
    MqttBus, MqttConfig, SharedServices,
};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("unas_bridge=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("rumqttc=warn".parse()?)
        .add_directive("russh=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting UNAS bridge {}", env!("CARGO_PKG_VERSION"));

    let config_dir = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let config_manager = ConfigManager::new(config_dir).await?;
    let config = config_manager.get_current_config();
    info!("Configuration loaded: {} appliances", config.appliances.len());

    let database = Arc::new(Database::new(&config.database_path).await?);
    info!("Database initialized");

    let alert_service = Arc::new(AlertService::new(
        config.alarm_webhook_url.clone(),
        Some(database.clone()),
    ));
    if config.alarm_webhook_url.is_empty() {
        warn!("No alarm_webhook_url configured, issues are only stored locally");
    }

    let bus = MqttBus::start(&config.mqtt);
    if bus.wait_connected(mqtt::STARTUP_WAIT).await {
        info!("Connected to MQTT broker {}:{}", config.mqtt.host, config.mqtt.port);
    } else {
        warn!(
            "MQTT broker {}:{} not reachable yet, continuing in the background",
            config.mqtt.host, config.mqtt.port
        );
    }

    let services = SharedServices {
        bus: bus.clone(),
        registry: database.clone(),
        ledger: database.clone(),
        reporter: alert_service.clone(),
        scripts_dir: PathBuf::from(&config.scripts_dir),
        credentials: DaemonCredentials::from_config(&config.mqtt),
        version: None,
    };
    if services.credentials.is_none() {
        warn!("MQTT credentials incomplete, daemons keep their previous broker settings");
    }

    let installations = Arc::new(Installations::new());
    for (name, appliance) in &config.appliances {
        let entry_id = database.entry_id_for(name).await?;
        tokio::spawn(set_up_with_retry(
            name.clone(),
            entry_id,
            appliance.clone(),
            config.mqtt.clone(),
            services.clone(),
            installations.clone(),
        ));
    }

    let state = AppState::new(
        config.clone(),
        installations.clone(),
        alert_service,
        Some(database),
    );
    let server = tokio::spawn(async move {
        if let Err(e) = start_web_server(state).await {
            error!("Web server stopped: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    server.abort();
    installations.unload_all().await;
    bus.shutdown().await;
    Ok(())
}

/// Keep trying until the installation is up; the appliance or broker may
/// simply not be reachable yet
async fn set_up_with_retry(
    name: String,
    entry_id: String,
    appliance: ApplianceConfig,
    mqtt_config: MqttConfig,
    services: SharedServices,
    installations: Arc<Installations>,
) {
    if let Err(e) = setup::validate(&appliance, &mqtt_config).await {
        warn!("Setup checks for {} failed ({}), trying anyway", name, e.code());
    }
    loop {
        match Installation::connect(&name, &entry_id, &appliance, &services).await {
            Ok(installation) => {
                installations.insert(installation);
                return;
            }
            Err(e) => {
                error!(
                    "Setup of {} failed, retrying in {}s: {}",
                    name,
                    polling::SETUP_RETRY_DELAY.as_secs(),
                    e
                );
                tokio::time::sleep(polling::SETUP_RETRY_DELAY).await;
            }
        }
    }
}
