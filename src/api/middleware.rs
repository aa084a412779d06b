//! Middleware Components
//!
//! CORS, request tracking and the shared-secret check for operator endpoints.

use super::errors::ApiError;
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer, ExposeHeaders};
use uuid::Uuid;

/// Request ID header key
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the operator key for cleanup and settings writes
pub const OPERATOR_KEY_HEADER: &str = "x-cleanup-key";

/// Env var holding the operator key. Unset means the check is skipped.
pub const OPERATOR_KEY_ENV: &str = "CLEANUP_API_KEY";

/// Create CORS middleware with configurable origins
pub fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let expose = ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(expose)
    } else {
        CorsLayer::new()
            .allow_origin(
                allowed_origins
                    .into_iter()
                    .filter_map(|o| o.parse::<HeaderValue>().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers(Any)
            .expose_headers(expose)
    }
}

/// Middleware to add request ID to all requests
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Request ID wrapper for extracting in handlers
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Check the operator key against `expected`. `None` disables the check.
pub fn check_operator_key(headers: &HeaderMap, expected: Option<&str>, request_id: &str) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers.get(OPERATOR_KEY_HEADER).and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::unauthorized(
            request_id.to_string(),
            "Invalid or missing cleanup API key".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_key_check() {
        let mut headers = HeaderMap::new();
        assert!(check_operator_key(&headers, None, "r").is_ok());
        assert!(check_operator_key(&headers, Some("s3cret"), "r").is_err());

        headers.insert(OPERATOR_KEY_HEADER, HeaderValue::from_static("s3cret"));
        assert!(check_operator_key(&headers, Some("s3cret"), "r").is_ok());
        assert!(check_operator_key(&headers, Some("other"), "r").is_err());
    }
}
