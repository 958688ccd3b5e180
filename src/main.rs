use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;

use cognitive_battery::core::config::ServerConfig;
use cognitive_battery::core::coordinator::BatteryCoordinator;
use cognitive_battery::core::metrics;
use cognitive_battery::storage::{MemorySessionStore, SqliteResultStore};
use cognitive_battery::web::server::start_web_server;

#[actix_web::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting cognitive battery service...");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Battery configured with {} levels, {} problems each",
        config.battery.levels.len(),
        config.battery.problems_per_level
    );

    let results = match SqliteResultStore::open(&config.database_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open result store: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let sessions = Arc::new(MemorySessionStore::new(config.session_capacity));
    metrics::register_metrics();

    let coordinator = Arc::new(BatteryCoordinator::new(
        config.battery.clone(),
        &config.admin_password,
        sessions,
        results,
    ));

    if let Err(e) = start_web_server(coordinator, &config.bind_address).await {
        error!("Web server stopped with an error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Cognitive battery service shutdown complete");
    ExitCode::SUCCESS
}
