//! Per-request credentials pipeline: bearer token → session lookup → PoP
//! validation, in the order spec.md §4.E lays out.
//!
//! Grounded on `original_source`'s `src/auth/credentials.py::get_credentials`
//! — including the "HMAC check bypassed only by a process-wide debug flag"
//! behavior.

use subtle::ConstantTimeEq;

use super::{jwt, pop};
use crate::cache::{NonceCache, SessionCache};
use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub username: String,
    pub uuid: String,
    pub master_key: [u8; 32],
}

/// Validates a request's `Authorization` and `X-SRP-PoP` headers.
///
/// `authorization` is the raw header value, e.g. `"Bearer <jwt>"`.
/// `pop_header` is the raw `X-SRP-PoP` header value, if present.
/// `hmac_enabled` is the process-wide debug override; PoP validation is
/// otherwise mandatory on every call.
#[allow(clippy::too_many_arguments)]
pub async fn authenticate(
    authorization: Option<&str>,
    pop_header: Option<&str>,
    method: &str,
    path: &str,
    server_secret: &[u8],
    sessions: &SessionCache,
    nonces: &NonceCache,
    timestamp_validity: i64,
    hmac_enabled: bool,
) -> Result<AuthenticatedUser, ApiError> {
    let token = authorization
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".into()))?;

    let claims = jwt::decode_token(token, server_secret)
        .ok_or_else(|| ApiError::Unauthenticated("invalid or expired token".into()))?;

    let master_key = sessions
        .get(&claims.uuid)
        .await
        .ok_or_else(|| ApiError::Unauthenticated("unknown or expired session".into()))?;

    if !hmac_enabled {
        return Ok(AuthenticatedUser { username: claims.sub, uuid: claims.uuid, master_key });
    }

    let raw = pop_header.ok_or_else(|| ApiError::PoPFailure("missing PoP".into()))?;
    let parsed = pop::parse_pop_header(raw).map_err(|_| ApiError::PoPFailure("malformed PoP".into()))?;

    let now = chrono::Utc::now().timestamp();
    if parsed.timestamp < now - timestamp_validity {
        return Err(ApiError::PoPFailure("invalid timestamp".into()));
    }

    if nonces.contains(&parsed.nonce) {
        return Err(ApiError::PoPFailure("nonce reused".into()));
    }
    nonces.insert(parsed.nonce.clone()).await;

    let expected = pop::compute_pop(&master_key, method, path, parsed.timestamp, &parsed.nonce);
    if !bool::from(expected.ct_eq(parsed.hmac.as_slice())) {
        return Err(ApiError::PoPFailure("invalid PoP".into()));
    }

    Ok(AuthenticatedUser { username: claims.sub, uuid: claims.uuid, master_key })
}
