use serde::{Deserialize, Serialize};

use crate::assessment::selector::BatteryKind;
use crate::core::error::BatteryError;

/// Submitted recall attempt
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: Vec<usize>,
}

impl AnswerRequest {
    /// Parse a raw body, reporting shape problems as `MalformedInput`
    pub fn from_value(value: serde_json::Value) -> Result<Self, BatteryError> {
        serde_json::from_value(value).map_err(|e| {
            BatteryError::MalformedInput(format!("answer must be a list of region ids: {}", e))
        })
    }
}

/// Admin listing query
#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    pub pw: Option<String>,
}

/// Visit start response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub status: String,
    pub battery: BatteryKind,
    pub next_target: String,
}

/// Status/message response used by the answer and result endpoints
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_target: Option<String>,
}

impl StatusResponse {
    pub fn new(status: &str, message: Option<&str>) -> Self {
        Self {
            status: status.to_string(),
            message: message.map(str::to_string),
            next_target: None,
        }
    }
}

/// Result listing response
#[derive(Serialize)]
pub struct ListingResponse<T: Serialize> {
    pub success: bool,
    pub results: Vec<T>,
}

/// Error response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status: String,
    pub success: bool,
    pub error: String,
    pub error_code: String,
}

impl From<&BatteryError> for ErrorResponse {
    fn from(err: &BatteryError) -> Self {
        Self {
            status: "error".to_string(),
            success: false,
            error: err.to_string(),
            error_code: err.code().to_string(),
        }
    }
}
