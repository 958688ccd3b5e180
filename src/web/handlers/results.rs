//! Result capture for device-scored tests and the admin listings

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;

use crate::core::error::BatteryError;
use crate::web::handlers::{error_response, session_id};
use crate::web::models::{AdminQuery, ListingResponse, StatusResponse};
use crate::web::server::AppState;

fn saved(result: Result<(), BatteryError>) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::Ok().json(StatusResponse::new(
            "success",
            Some("Result saved successfully."),
        )),
        Err(e) => error_response(&e),
    }
}

fn listing<T: Serialize>(result: Result<Vec<T>, BatteryError>) -> HttpResponse {
    match result {
        Ok(results) => HttpResponse::Ok().json(ListingResponse { success: true, results }),
        Err(e) => error_response(&e),
    }
}

/// Store a digit span (B-Set) result
pub async fn submit_digit_span(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> impl Responder {
    let result = match session_id(&req) {
        Ok(session) => data.coordinator.record_digit_span(&session, body.into_inner()).await,
        Err(e) => Err(e),
    };
    saved(result)
}

/// Store a Wisconsin card-sorting result
pub async fn submit_wisconsin(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> impl Responder {
    let result = match session_id(&req) {
        Ok(session) => data.coordinator.record_wisconsin(&session, body.into_inner()).await,
        Err(e) => Err(e),
    };
    saved(result)
}

pub async fn list_digit_span(data: web::Data<AppState>, query: web::Query<AdminQuery>) -> impl Responder {
    listing(data.coordinator.list_digit_span(query.pw.as_deref()))
}

pub async fn list_sequence_memory(data: web::Data<AppState>, query: web::Query<AdminQuery>) -> impl Responder {
    listing(data.coordinator.list_sequence_memory(query.pw.as_deref()))
}

pub async fn list_wisconsin(data: web::Data<AppState>, query: web::Query<AdminQuery>) -> impl Responder {
    listing(data.coordinator.list_wisconsin(query.pw.as_deref()))
}
