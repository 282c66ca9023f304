//! HS256 bearer tokens signed with a per-user derived key (spec.md §4.E).
//!
//! Grounded on `original_source`'s `src/auth/jwt.py`: the signing key is
//! `SHA3-256(username ∥ server_secret)` rather than the raw server secret,
//! so a token for one user can never validate as a token for another even
//! under the same secret. `decode_token` mirrors the Python two-pass
//! decode: read `sub` without checking the signature, derive that user's
//! key, then verify for real.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub uuid: String,
    pub iat: i64,
    pub exp: i64,
}

fn derive_signing_key(username: &str, server_secret: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(username.as_bytes());
    hasher.update(server_secret);
    hasher.finalize().into()
}

/// Issues a bearer token for `username`/`uuid`, expiring at `expires_at`
/// (Unix seconds).
pub fn generate_token(
    username: &str,
    uuid: &str,
    server_secret: &[u8],
    expires_at: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: username.to_string(),
        uuid: uuid.to_string(),
        iat: chrono::Utc::now().timestamp(),
        exp: expires_at,
    };
    let key = derive_signing_key(username, server_secret);
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(&key))
}

/// Reads `sub` out of the token body without checking the signature. Used
/// only to look up which per-user key to verify against next.
fn peek_subject(token: &str) -> Option<String> {
    use base64::Engine;
    let payload_b64 = token.split('.').nth(1)?;
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&payload).ok()?;
    value.get("sub")?.as_str().map(str::to_string)
}

/// Verifies the token's signature under its subject's derived key, and
/// that `iat <= now < exp`. Returns `None` for any failure — malformed
/// token, wrong signature, or an expired/not-yet-valid window.
pub fn decode_token(token: &str, server_secret: &[u8]) -> Option<Claims> {
    let sub = peek_subject(token)?;
    let key = derive_signing_key(&sub, server_secret);

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["sub", "exp"]);
    validation.leeway = 0;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&key), &validation).ok()?;

    let now = chrono::Utc::now().timestamp();
    if data.claims.iat > now {
        return None;
    }
    Some(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_for_its_own_subject() {
        let secret = b"server-secret-bytes";
        let token = generate_token("alice", "session-uuid", secret, chrono::Utc::now().timestamp() + 60).unwrap();
        let claims = decode_token(&token, secret).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.uuid, "session-uuid");
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = b"server-secret-bytes";
        let token = generate_token("alice", "session-uuid", secret, chrono::Utc::now().timestamp() - 5).unwrap();
        assert!(decode_token(&token, secret).is_none());
    }

    #[test]
    fn token_cannot_be_replayed_as_a_different_subject() {
        // The per-user derived key means a token's signature cannot be
        // reinterpreted under a different username's key.
        let secret = b"server-secret-bytes";
        let mut token = generate_token("alice", "session-uuid", secret, chrono::Utc::now().timestamp() + 60).unwrap();

        // Forge the `sub` claim inline without re-signing.
        use base64::Engine;
        let parts: Vec<&str> = token.split('.').collect();
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        value["sub"] = serde_json::Value::String("mallory".into());
        let forged_payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(&value).unwrap());
        token = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(decode_token(&token, secret).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token("alice", "session-uuid", b"secret-a", chrono::Utc::now().timestamp() + 60).unwrap();
        assert!(decode_token(&token, b"secret-b").is_none());
    }
}
