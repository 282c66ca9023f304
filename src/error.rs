//! Crate-wide error type and its mapping onto HTTP responses.
//!
//! Internal code propagates `anyhow::Result` freely (teacher convention);
//! `ApiError` exists only at the one boundary that needs a typed-to-HTTP
//! mapping: handler return values and the encryption middleware.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// The error kinds named in the spec's error-handling design, one variant
/// per row of its failure-semantics table.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// SRP invariant violated (`A mod N = 0`, `u = 0`, M1 mismatch). Only
    /// ever surfaced on the auth channel as an `ERR` message — never as an
    /// HTTP response — but kept in this enum so channel code can reuse the
    /// same vocabulary as request handlers.
    #[error("protocol fault: {0}")]
    ProtocolFault(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("proof-of-possession failure: {0}")]
    PoPFailure(String),

    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail, extra_header): (StatusCode, String, Option<(&'static str, &'static str)>) =
            match &self {
                ApiError::ProtocolFault(m) => (StatusCode::BAD_REQUEST, m.clone(), None),
                ApiError::Unauthenticated(m) => {
                    (StatusCode::UNAUTHORIZED, m.clone(), Some(("WWW-Authenticate", "Bearer")))
                }
                ApiError::PoPFailure(m) => (
                    StatusCode::UNAUTHORIZED,
                    m.clone(),
                    Some(("X-SRP-PoP", r#""<timestamp> <b64nonce> <b64hmac>""#)),
                ),
                ApiError::CryptoFailure(m) => (StatusCode::UNAUTHORIZED, m.clone(), None),
                ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone(), None),
                ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone(), None),
                ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone(), None),
                ApiError::PayloadTooLarge => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string(), None)
                }
                ApiError::ServiceUnavailable(m) => {
                    (StatusCode::SERVICE_UNAVAILABLE, m.clone(), None)
                }
                ApiError::Internal(e) => {
                    tracing::error!(err = %e, "internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                        None,
                    )
                }
            };

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();
        if let Some((name, value)) = extra_header {
            response
                .headers_mut()
                .insert(name, HeaderValue::from_static(value));
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
