use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::MEMORAI_STATUS_HEADER;
use crate::engine::{EngineError, ErrorCode};

#[derive(Debug, Error)]
/// Failures surfaced by the transport adapter.
pub enum GatewayError {
    /// The request body or parameters did not decode into an operation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl GatewayError {
    fn code(&self) -> ErrorCode {
        match self {
            GatewayError::InvalidRequest(_) => ErrorCode::InvalidInput,
            GatewayError::Engine(e) => e.code(),
        }
    }
}

/// Wire error payload: `{code, message, details?, at}`.
#[derive(serde::Serialize)]
pub struct ErrorBody {
    /// Taxonomy code.
    pub code: &'static str,
    /// Stable short message.
    pub message: String,
    /// Structured extras (e.g. rate-limit decisions).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// When the error was produced.
    pub at: DateTime<Utc>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = match code {
            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::AuthFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::SchemaMismatch => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let details = match &self {
            GatewayError::Engine(EngineError::RateLimited { decision }) => {
                serde_json::to_value(decision).ok()
            }
            _ => None,
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            MEMORAI_STATUS_HEADER,
            HeaderValue::from_str(code.as_str()).unwrap_or(HeaderValue::from_static("error")),
        );

        let body = Json(ErrorBody {
            code: code.as_str(),
            message: self.to_string(),
            details,
            at: Utc::now(),
        });

        (status, headers, body).into_response()
    }
}
