pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::installation::Installations;
use crate::services::AlertService;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub installations: Arc<Installations>,
    pub alert_service: Arc<AlertService>,
    // Absent when running without persistence (tests)
    pub database: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        installations: Arc<Installations>,
        alert_service: Arc<AlertService>,
        database: Option<Arc<Database>>,
    ) -> Self {
        Self {
            config,
            installations,
            alert_service,
            database,
        }
    }
}
