//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use spring83::SpringError;
use std::fmt;
use tracing::{error, warn};

/// An error answered to the client as `<code> - <reason>: <message>`.
///
/// `log` carries detail that stays in the server log. Internal errors never
/// expose a message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub log: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            log: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "board not found")
    }

    pub fn internal(detail: impl fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: String::new(),
            log: Some(detail.to_string()),
        }
    }

    /// Attaches server-side detail to the error.
    pub fn with_log(mut self, detail: impl fmt::Display) -> Self {
        self.log = Some(detail.to_string());
        self
    }
}

impl From<SpringError> for ApiError {
    fn from(err: SpringError) -> Self {
        match err {
            SpringError::MalformedKey(_) => Self::bad_request("invalid key").with_log(err),
            SpringError::MalformedBoard(_) => Self::bad_request("bad board").with_log(err),
            SpringError::NotFound(_) => Self::not_found(),
            SpringError::Conflict(msg) => Self::new(StatusCode::CONFLICT, msg),
            SpringError::Forbidden(msg) => Self::forbidden(msg),
            other => Self::internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let reason = self.status.canonical_reason().unwrap_or("");
        if self.status.is_server_error() {
            error!(
                status = self.status.as_u16(),
                "internal error: {}",
                self.log.as_deref().unwrap_or("unknown")
            );
            return (self.status, format!("{} - {}", self.status.as_u16(), reason)).into_response();
        }

        if let Some(detail) = &self.log {
            warn!(status = self.status.as_u16(), "{}: {}", self.message, detail);
        }
        let body = if self.message.is_empty() {
            format!("{} - {}", self.status.as_u16(), reason)
        } else {
            format!("{} - {}: {}", self.status.as_u16(), reason, self.message)
        };
        (self.status, body).into_response()
    }
}
