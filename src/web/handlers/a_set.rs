//! Web handlers for the sequence-memory (A-Set) battery

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::core::coordinator::{PracticeOutcome, ProblemStep};
use crate::core::error::BatteryError;
use crate::web::handlers::{error_response, session_id};
use crate::web::models::{AnswerRequest, StatusResponse};
use crate::web::server::AppState;

/// Issue a practice problem
pub async fn practice_problem(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let session = match session_id(&req) {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };

    match data.coordinator.practice_problem(&session).await {
        Ok(problem) => HttpResponse::Ok().json(problem),
        Err(e) => error_response(&e),
    }
}

/// Check a practice answer
pub async fn practice_answer(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> impl Responder {
    let result: Result<PracticeOutcome, BatteryError> = async {
        let session = session_id(&req)?;
        let request = AnswerRequest::from_value(body.into_inner())?;
        data.coordinator.submit_practice_answer(&session, &request.answer).await
    }
    .await;

    match result {
        Ok(PracticeOutcome::Correct) => HttpResponse::Ok().json(StatusResponse::new(
            "correct",
            Some("Correct! You can start the main test."),
        )),
        Ok(PracticeOutcome::Incorrect) => HttpResponse::Ok().json(StatusResponse::new(
            "incorrect",
            Some("Not quite. Watch the sequence again."),
        )),
        Err(e) => error_response(&e),
    }
}

/// Issue the next scored problem, or report completion
pub async fn next_problem(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let session = match session_id(&req) {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };

    match data.coordinator.next_problem(&session).await {
        Ok(ProblemStep::Problem(issued)) => HttpResponse::Ok().json(issued),
        Ok(ProblemStep::Completed { next_target }) => HttpResponse::Ok().json(StatusResponse {
            status: "completed".to_string(),
            message: Some("Sequence memory test complete.".to_string()),
            next_target: Some(next_target),
        }),
        Err(e) => error_response(&e),
    }
}

/// Score an answer to the outstanding scored problem
pub async fn submit_answer(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> impl Responder {
    let result: Result<(), BatteryError> = async {
        let session = session_id(&req)?;
        let request = AnswerRequest::from_value(body.into_inner())?;
        data.coordinator.submit_answer(&session, &request.answer).await
    }
    .await;

    match result {
        Ok(()) => HttpResponse::Ok().json(StatusResponse::new("next_problem", None)),
        Err(e) => error_response(&e),
    }
}
