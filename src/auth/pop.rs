//! Proof-of-Possession header: parsing, generation, and the underlying
//! HMAC (spec.md §4.E).
//!
//! Grounded on `original_source`'s `src/auth/pop.py`, adapted to this
//! spec's base64 framing (`"<timestamp> <b64nonce> <b64hmac>"`) rather
//! than that file's legacy hex encoding — the wire format this server
//! actually speaks is §4.E's, not the historical one. Hand-rolled parsing
//! is used in place of a regex crate, matching the rest of this codebase's
//! dependency footprint (see DESIGN.md).

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;
const HMAC_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PopError {
    #[error("malformed PoP header")]
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopHeader {
    pub timestamp: i64,
    pub nonce: Vec<u8>,
    pub hmac: Vec<u8>,
}

/// Parses `"<timestamp> <b64nonce> <b64hmac>"`. Rejects anything that
/// doesn't decode to exactly a 16-byte nonce and a 32-byte HMAC.
pub fn parse_pop_header(header: &str) -> Result<PopHeader, PopError> {
    let mut parts = header.split(' ');
    let ts_str = parts.next().ok_or(PopError::Malformed)?;
    let nonce_str = parts.next().ok_or(PopError::Malformed)?;
    let hmac_str = parts.next().ok_or(PopError::Malformed)?;
    if parts.next().is_some() {
        return Err(PopError::Malformed);
    }

    if ts_str.is_empty() || ts_str.len() > 10 || !ts_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PopError::Malformed);
    }
    let timestamp: i64 = ts_str.parse().map_err(|_| PopError::Malformed)?;

    let nonce = base64::engine::general_purpose::STANDARD
        .decode(nonce_str)
        .map_err(|_| PopError::Malformed)?;
    if nonce.len() != NONCE_LEN {
        return Err(PopError::Malformed);
    }

    let hmac = base64::engine::general_purpose::STANDARD
        .decode(hmac_str)
        .map_err(|_| PopError::Malformed)?;
    if hmac.len() != HMAC_LEN {
        return Err(PopError::Malformed);
    }

    Ok(PopHeader { timestamp, nonce, hmac })
}

/// `HMAC-SHA256(master_key, "<METHOD> <path> <timestamp> " ∥ nonce)`.
pub fn compute_pop(master_key: &[u8], method: &str, path: &str, timestamp: i64, nonce: &[u8]) -> [u8; HMAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(master_key).expect("HMAC accepts any key length");
    mac.update(format!("{method} {path} {timestamp} ").as_bytes());
    mac.update(nonce);
    mac.finalize().into_bytes().into()
}

pub fn generate_pop_header(master_key: &[u8], method: &str, path: &str, timestamp: i64, nonce: &[u8]) -> String {
    let hmac = compute_pop(master_key, method, path, timestamp, nonce);
    format!(
        "{timestamp} {} {}",
        base64::engine::general_purpose::STANDARD.encode(nonce),
        base64::engine::general_purpose::STANDARD.encode(hmac),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let master_key = b"0123456789abcdef0123456789abcdef";
        let nonce = [7u8; NONCE_LEN];
        let header = generate_pop_header(master_key, "GET", "/api/files/list/foo", 1_700_000_000, &nonce);

        let parsed = parse_pop_header(&header).unwrap();
        assert_eq!(parsed.timestamp, 1_700_000_000);
        assert_eq!(parsed.nonce, nonce);

        let expected = compute_pop(master_key, "GET", "/api/files/list/foo", 1_700_000_000, &nonce);
        assert_eq!(parsed.hmac, expected);
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert_eq!(parse_pop_header("").unwrap_err(), PopError::Malformed);
        assert_eq!(parse_pop_header("notanumber AAAA BBBB").unwrap_err(), PopError::Malformed);
        assert_eq!(parse_pop_header("123 ").unwrap_err(), PopError::Malformed);
        assert_eq!(parse_pop_header("123 AAAA BBBB extra").unwrap_err(), PopError::Malformed);
    }

    #[test]
    fn different_methods_or_paths_produce_different_hmacs() {
        let master_key = b"a-master-key-of-some-length....";
        let nonce = [1u8; NONCE_LEN];
        let a = compute_pop(master_key, "GET", "/api/files/list/foo", 100, &nonce);
        let b = compute_pop(master_key, "POST", "/api/files/list/foo", 100, &nonce);
        let c = compute_pop(master_key, "GET", "/api/files/list/bar", 100, &nonce);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
