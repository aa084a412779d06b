//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.
//! Wager rejections carry their stable reason code so game clients can
//! branch on it.

use crate::errors::{LedgerError, RewardsError, StorageError, WagerError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// NOT_FOUND, BAD_REQUEST, MIN_BET_NOT_MET, ...
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Rejected(WagerError),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn unauthorized(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Map a domain error onto the HTTP surface
    pub fn from_rewards(request_id: String, err: RewardsError) -> Self {
        let kind = match err {
            RewardsError::Wager(e) => ApiErrorKind::Rejected(e),
            RewardsError::NotFound(what) => ApiErrorKind::NotFound(format!("{} not found", what)),
            RewardsError::Conflict { game_id } => {
                ApiErrorKind::Conflict(format!("game {} changed concurrently, retry", game_id))
            }
            RewardsError::Ledger(LedgerError::InsufficientBalance { balance, delta }) => {
                ApiErrorKind::Rejected(WagerError::InsufficientBalance {
                    stake: -delta,
                    balance,
                })
            }
            RewardsError::Ledger(LedgerError::UserNotFound(id)) => {
                ApiErrorKind::NotFound(format!("user {} not found", id))
            }
            RewardsError::Storage(StorageError::Timeout(ms)) => {
                ApiErrorKind::ServiceUnavailable(format!("storage timed out after {} ms", ms))
            }
            other => ApiErrorKind::InternalError(other.to_string()),
        };
        Self { kind, request_id }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Unauthorized(msg) => write!(f, "[{}] Unauthorized: {}", self.request_id, msg),
            ApiErrorKind::Conflict(msg) => write!(f, "[{}] Conflict: {}", self.request_id, msg),
            ApiErrorKind::Rejected(e) => write!(f, "[{}] Rejected ({}): {}", self.request_id, e.code(), e),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
            ApiErrorKind::ServiceUnavailable(msg) => {
                write!(f, "[{}] Service Unavailable: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiErrorKind::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiErrorKind::Rejected(e) => {
                let status = match e {
                    WagerError::GameInProgress(_) => StatusCode::CONFLICT,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.code(), e.to_string())
            }
            ApiErrorKind::InternalError(msg) => {
                tracing::error!(request_id = %self.request_id, error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
            ApiErrorKind::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg.clone())
            }
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: None,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wager_rejection_keeps_reason_code() {
        let err = ApiError::from_rewards("req-1".to_string(), WagerError::GameDisabled.into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn game_in_progress_is_conflict() {
        let err = ApiError::from_rewards(
            "req-2".to_string(),
            WagerError::GameInProgress("mines".to_string()).into(),
        );
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_timeout_is_unavailable() {
        let err = ApiError::from_rewards("req-3".to_string(), StorageError::Timeout(10_000).into());
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
