use actix_web::{web, HttpResponse, Responder};

use crate::core::metrics;
use crate::web::server::AppState;

/// Service version and the active battery configuration
pub async fn get_status(data: web::Data<AppState>) -> impl Responder {
    let config = data.coordinator.config();
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "version": env!("CARGO_PKG_VERSION"),
        "levels": config.levels,
        "problemsPerLevel": config.problems_per_level,
        "practiceLevel": config.practice_level,
        "canvas": config.canvas,
    }))
}

/// Prometheus exposition
pub async fn get_metrics() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::render())
}
