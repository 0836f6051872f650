use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Public error code attached to app-token failures.
pub const APP_ERROR_AUTH_ERROR: &str = "APP_ERROR_AUTH_ERROR";

/// Responses produced when a guard refuses a request.
///
/// Access-token denials deliberately carry nothing but `success: false`.
#[derive(Debug, Error)]
pub enum AuthRejection {
    #[error("access token rejected")]
    AccessDenied,
    #[error("app token rejected")]
    AppDenied,
    #[error("authentication is not configured")]
    Misconfigured,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AuthRejection::AccessDenied => (StatusCode::UNAUTHORIZED, json!({ "success": false })),
            AuthRejection::AppDenied => (
                StatusCode::UNAUTHORIZED,
                json!({
                    "success": false,
                    "message": "Authentication failed",
                    "code": APP_ERROR_AUTH_ERROR,
                }),
            ),
            AuthRejection::Misconfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "message": self.to_string() }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
