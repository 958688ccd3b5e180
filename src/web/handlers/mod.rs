pub mod visit;
pub mod a_set;
pub mod results;
pub mod system;

use actix_web::{HttpRequest, HttpResponse};
use log::error;

use crate::core::error::BatteryError;
use crate::web::models::ErrorResponse;

/// Cookie carrying the visit's session id
pub const SESSION_COOKIE: &str = "battery_session";

/// Session id of the current request, if a visit was started
pub fn session_id(req: &HttpRequest) -> Result<String, BatteryError> {
    req.cookie(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| BatteryError::InvalidState("session expired or never started".to_string()))
}

/// Map a core error onto an HTTP response
pub fn error_response(err: &BatteryError) -> HttpResponse {
    let body = ErrorResponse::from(err);
    match err {
        BatteryError::InvalidState(_) => HttpResponse::Conflict().json(body),
        BatteryError::MalformedInput(_) => HttpResponse::BadRequest().json(body),
        BatteryError::Unauthorized(_) => HttpResponse::Forbidden().json(body),
        BatteryError::ConfigurationError(_) | BatteryError::PersistenceFailure(_) => {
            error!("Request failed: {}", err);
            HttpResponse::InternalServerError().json(body)
        }
    }
}
