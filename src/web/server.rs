use std::sync::Arc;

use actix_web::{error, middleware, web, App, HttpServer};
use log::{info, warn};

use crate::core::coordinator::BatteryCoordinator;
use crate::core::error::BatteryError;
use crate::web::handlers;

/// Shared application state for web handlers
pub struct AppState {
    pub coordinator: Arc<BatteryCoordinator>,
}

/// Unparseable JSON bodies answer with the common error shape
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        warn!("Rejected request body: {}", err);
        let response = handlers::error_response(&BatteryError::MalformedInput(err.to_string()));
        error::InternalError::from_response(err, response).into()
    })
}

/// Register every API route
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            // Visit
            .route("/start", web::post().to(handlers::visit::start))

            // Sequence memory (A-Set)
            .route("/a-set/practice-problem", web::get().to(handlers::a_set::practice_problem))
            .route("/a-set/practice-answer", web::post().to(handlers::a_set::practice_answer))
            .route("/a-set/problem", web::get().to(handlers::a_set::next_problem))
            .route("/a-set/answer", web::post().to(handlers::a_set::submit_answer))

            // Device-scored results
            .route("/submit-result", web::post().to(handlers::results::submit_digit_span))
            .route("/submit-wisconsin-result", web::post().to(handlers::results::submit_wisconsin))

            // Admin listings
            .route("/results/digit-span", web::get().to(handlers::results::list_digit_span))
            .route("/results/sequence-memory", web::get().to(handlers::results::list_sequence_memory))
            .route("/results/wisconsin", web::get().to(handlers::results::list_wisconsin))

            // System
            .route("/system/status", web::get().to(handlers::system::get_status))
            .route("/system/metrics", web::get().to(handlers::system::get_metrics)),
    );
}

/// Start the HTTP boundary for the battery service
pub async fn start_web_server(
    coordinator: Arc<BatteryCoordinator>,
    bind_address: &str,
) -> std::io::Result<()> {
    info!("Starting web server on http://{}", bind_address);

    let app_state = web::Data::new(AppState { coordinator });

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .bind(bind_address)?
    .run()
    .await
}
