use actix_web::cookie::Cookie;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::warn;

use crate::core::error::BatteryError;
use crate::storage::records::SubjectProfile;
use crate::web::handlers::{error_response, SESSION_COOKIE};
use crate::web::models::StartResponse;
use crate::web::server::AppState;

/// Register the subject, clear any previous visit and pick the battery
pub async fn start(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> impl Responder {
    let profile: SubjectProfile = match serde_json::from_value(body.into_inner()) {
        Ok(profile) => profile,
        Err(e) => {
            warn!("Unreadable subject profile: {}", e);
            return error_response(&BatteryError::MalformedInput(format!(
                "invalid subject profile: {}",
                e
            )));
        }
    };

    let previous = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());

    match data.coordinator.begin_visit(profile, previous.as_deref()).await {
        Ok(visit) => {
            let cookie = Cookie::build(SESSION_COOKIE, visit.session_id.clone())
                .path("/")
                .http_only(true)
                .finish();
            HttpResponse::Ok().cookie(cookie).json(StartResponse {
                status: "started".to_string(),
                battery: visit.battery,
                next_target: visit.next_target,
            })
        }
        Err(e) => error_response(&e),
    }
}
