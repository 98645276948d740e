use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use onsam_domain::OnsError;
use serde_json::json;

/// API-level error: an HTTP status plus the GENI code the delegate maps the
/// failure onto.
pub struct ApiError {
    pub status: StatusCode,
    pub geni_code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, geni_code: "BadArgs", message: msg.into() }
    }

    pub fn search_failed(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, geni_code: "SearchFailed", message: msg.into() }
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::CONFLICT, geni_code: "AlreadyExists", message: msg.into() }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            geni_code: "GeneralError",
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message, "geni_code": self.geni_code }));
        (self.status, body).into_response()
    }
}

impl From<OnsError> for ApiError {
    fn from(e: OnsError) -> Self {
        match e {
            OnsError::NotFound(_) => ApiError::search_failed(e.to_string()),
            OnsError::NotAvailable(_) => ApiError::already_exists(e.to_string()),
            OnsError::Ons(_) => ApiError::general(e.to_string()),
        }
    }
}
