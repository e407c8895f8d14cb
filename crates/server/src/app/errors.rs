//! Maps `BuckleyError` to the unary HTTP status + message shape (§7
//! "unary operations return the status code and message").

use axum::http::StatusCode;
use axum::response::IntoResponse;
use buckley_core::BuckleyError;
use serde_json::json;

pub fn buckley_error_to_response(err: BuckleyError) -> axum::response::Response {
    let status = match &err {
        BuckleyError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        BuckleyError::NotFound(_) => StatusCode::NOT_FOUND,
        BuckleyError::AlreadyExists(_) => StatusCode::CONFLICT,
        BuckleyError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
        BuckleyError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        BuckleyError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        BuckleyError::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
        BuckleyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        BuckleyError::Canceled => StatusCode::from_u16(499).unwrap(),
    };
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (status, axum::Json(json!({ "error": code, "message": message.into() }))).into_response()
}
