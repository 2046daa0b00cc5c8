use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::messages::anthropic::{ErrorBody, ErrorResponse};

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Proxy errors with appropriate HTTP status codes.
///
/// Translator functions surface these by value; the HTTP surface maps them
/// to status codes and a client-dialect error envelope. Messages never
/// contain API keys or raw upstream headers.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Malformed client payload, missing required fields, or a
    /// tool-consistency violation.
    #[error("{0}")]
    BadRequest(String),

    /// The upstream rejected the forwarded credentials.
    #[error("{message}")]
    Unauthorized {
        /// The upstream's status code (401 or 403).
        status: u16,
        /// Sanitized message.
        message: String,
    },

    /// The upstream returned a body the response transformer cannot parse.
    #[error("{0}")]
    UpstreamProtocol(String),

    /// The upstream connect or read timeout was reached.
    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),

    /// The upstream returned a non-2xx status with a usable error body;
    /// the body is forwarded verbatim under the upstream's status code.
    #[error("upstream returned status {status}")]
    UpstreamStatus {
        /// The upstream's status code.
        status: u16,
        /// The upstream's error body, forwarded as-is.
        body: Vec<u8>,
    },

    /// Invariant violation inside the core.
    /// If Some(message), it is safe to show; if None, details stay internal.
    #[error("internal server error")]
    Internal(Option<String>),
}

impl ProxyError {
    /// The HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::UNAUTHORIZED)
            }
            Self::UpstreamProtocol(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The error type string for the envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "invalid_request_error",
            Self::Unauthorized { .. } => "authentication_error",
            Self::UpstreamProtocol(_) | Self::UpstreamTimeout(_) | Self::UpstreamStatus { .. } => "api_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message that is safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(Some(message)) => message.clone(),
            Self::Internal(None) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// The client-dialect error body for this error.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            r#type: self.error_type().to_string(),
            message: self.client_message(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Usable upstream error bodies pass through untouched.
        if let Self::UpstreamStatus { body, .. } = self {
            return (status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response();
        }

        let envelope = ErrorResponse {
            r#type: "error".to_string(),
            error: self.body(),
        };

        (status, Json(envelope)).into_response()
    }
}
