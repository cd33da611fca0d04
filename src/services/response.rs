//! HTTP response building helpers
//!
//! Every handler answers with JSON; errors use `{ "error": message }` and a
//! status derived from the StorageError variant.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::StorageError;

pub type JsonResponse = Response<Full<Bytes>>;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> JsonResponse {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

pub fn ok<T: Serialize>(body: &T) -> JsonResponse {
    json_response(StatusCode::OK, body)
}

pub fn created<T: Serialize>(body: &T) -> JsonResponse {
    json_response(StatusCode::CREATED, body)
}

fn error_body(status: StatusCode, message: &str) -> JsonResponse {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn not_found(message: &str) -> JsonResponse {
    error_body(StatusCode::NOT_FOUND, message)
}

pub fn method_not_allowed() -> JsonResponse {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// HTTP status for a StorageError
pub fn status_for(error: &StorageError) -> StatusCode {
    match error {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidInput(_) | StorageError::Json(_) => StatusCode::BAD_REQUEST,
        StorageError::Unavailable(_) | StorageError::Connection(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a StorageError to an appropriate HTTP response
pub fn error_response(error: StorageError) -> JsonResponse {
    let status = status_for(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %error, "Request failed");
    }

    let mut response = error_body(status, &error.to_string());
    if error.is_retryable() {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, header::HeaderValue::from_static("1"));
    }
    response
}
