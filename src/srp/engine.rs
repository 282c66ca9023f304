//! Pure, side-effect-free SRP-6a server-side operations on a named group.
//!
//! Mirrors `original_source`'s `security/auth/srp.py` and
//! `security/srp/operation.py` bit-for-bit, including its deliberate
//! substitution of SHA3-256 for RFC 2945's SHA-interleave in the
//! premaster→master step, and its unpadded big-endian serialization of `A`
//! and `B` in the M1/M2 transcripts (only the multiplier derivation and
//! `compute_u`'s inputs are fixed-width padded).

use num_bigint::BigUint;
use num_traits::Zero;
use rand::RngCore;
use sha1::Sha1;
use sha3::{Digest, Sha3_256};

use super::group::{left_pad, SrpGroup};

/// Draw a cryptographically random exponent in `[0, 2^256)`, matching the
/// Python reference's `getrandbits(256)`.
pub fn random_private_value() -> BigUint {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

/// `B = (k*v + g^b) mod N`. If `private_value` is `None`, a fresh random
/// exponent is drawn; tests that need determinism pass one explicitly.
pub fn compute_server_public_value(
    group: &SrpGroup,
    verifier: &BigUint,
    private_value: Option<BigUint>,
) -> (BigUint, BigUint) {
    let b = private_value.unwrap_or_else(random_private_value);
    let public = (&group.k * verifier + group.g.modpow(&b, &group.n)) % &group.n;
    (b, public)
}

/// `true` if the client's public value is the forbidden `A mod N == 0`.
pub fn is_invalid_public_value(group: &SrpGroup, a_pub: &BigUint) -> bool {
    (a_pub % &group.n).is_zero()
}

/// `u = SHA1(PAD(A,|N|) || PAD(B,|N|))` as an integer.
pub fn compute_u(group: &SrpGroup, a_pub: &BigUint, b_pub: &BigUint) -> BigUint {
    let len = group.byte_len();
    let mut buf = left_pad(&a_pub.to_bytes_be(), len);
    buf.extend_from_slice(&left_pad(&b_pub.to_bytes_be(), len));
    let digest = <Sha1 as sha1::Digest>::digest(&buf);
    BigUint::from_bytes_be(&digest)
}

/// `(A * v^u mod N)^b mod N`.
pub fn compute_premaster(
    group: &SrpGroup,
    a_pub: &BigUint,
    server_private: &BigUint,
    u: &BigUint,
    verifier: &BigUint,
) -> BigUint {
    let vu = verifier.modpow(u, &group.n);
    let base = (a_pub * vu) % &group.n;
    base.modpow(server_private, &group.n)
}

/// `SHA3-256(PAD(premaster, |N|))` — the 32-byte session master key.
pub fn premaster_to_master(group: &SrpGroup, premaster: &BigUint) -> [u8; 32] {
    let padded = left_pad(&premaster.to_bytes_be(), group.byte_len());
    let digest = Sha3_256::digest(&padded);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Server's M1 confirmation value.
///
/// `SHA3-256((H(N) XOR H(g)) || salt || A || B || master)`, where `A` and
/// `B` are serialized as minimal (unpadded) big-endian integers. `username`
/// is only mixed in when `include_username` is set — see `DESIGN.md`'s
/// resolution of the spec's M1 open question; the default (`false`)
/// matches the RFC 5054 Appendix B test vectors.
pub fn generate_m1(
    group: &SrpGroup,
    salt: &[u8],
    a_pub: &BigUint,
    b_pub: &BigUint,
    master: &[u8; 32],
    username: Option<&str>,
    include_username: bool,
) -> [u8; 32] {
    let prime_hash = Sha3_256::digest(group.n.to_bytes_be());
    let generator_hash = Sha3_256::digest(group.g.to_bytes_be());
    let xored = BigUint::from_bytes_be(&prime_hash) ^ BigUint::from_bytes_be(&generator_hash);

    let mut pre_m = xored.to_bytes_be();
    if include_username {
        if let Some(name) = username {
            pre_m.extend_from_slice(&Sha3_256::digest(name.as_bytes()));
        }
    }
    pre_m.extend_from_slice(salt);
    pre_m.extend_from_slice(&a_pub.to_bytes_be());
    pre_m.extend_from_slice(&b_pub.to_bytes_be());
    pre_m.extend_from_slice(master);

    let digest = Sha3_256::digest(&pre_m);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Server's M2 confirmation value: `SHA3-256(A || m1 || master)`.
pub fn generate_m2(a_pub: &BigUint, m1: &[u8; 32], master: &[u8; 32]) -> [u8; 32] {
    let mut pre_m = a_pub.to_bytes_be();
    pre_m.extend_from_slice(m1);
    pre_m.extend_from_slice(master);
    let digest = Sha3_256::digest(&pre_m);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srp::group::SrpGroupName;
    use num_traits::Num;

    fn hex(s: &str) -> BigUint {
        let clean: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        BigUint::from_str_radix(&clean, 16).unwrap()
    }

    /// Hex digits of a `BigUint`, uppercase, no leading zero padding —
    /// matches the compact `0xABCD…WXYZ` notation spec.md §8 uses for its
    /// RFC 5054 Appendix B expected values.
    fn upper_hex(n: &BigUint) -> String {
        format!("{n:X}")
    }

    fn upper_hex_bytes(b: &[u8]) -> String {
        b.iter().map(|byte| format!("{byte:02X}")).collect()
    }

    /// Asserts a hex string starts and ends with the given fragments,
    /// mirroring spec.md's own `0xPPPP…SSSS` truncated notation for a value
    /// too long to reproduce in full in this file.
    fn assert_hex_bounds(label: &str, hex: &str, prefix: &str, suffix: &str) {
        assert!(hex.starts_with(prefix), "{label}: expected prefix {prefix}, got {hex}");
        assert!(hex.ends_with(suffix), "{label}: expected suffix {suffix}, got {hex}");
    }

    /// RFC 5054 Appendix B test vector, reproduced (truncated) in spec.md §8
    /// S1. `salt` and `b` are the RFC's published values verbatim; `A` is
    /// not hardcoded but derived from the RFC's published client exponent
    /// `a` via `g^a mod N`, so the one public value never directly checked
    /// against a literal here is still computed rather than asserted.
    #[test]
    fn rfc5054_appendix_b_vector() {
        let group = SrpGroup::for_name(SrpGroupName::Small);

        let salt = hex("BEB25379 D1A8581E B5A72767 3A2441EE");
        let verifier = hex(
            "7E273DE8 696FFC4F 4E337D05 B4B375BE B0DDE156 9E8FA00A 9886D812\
             9BADA1F1 822223CA 1A605B53 0E379BA4 729FDC59 F105B478 7E5186F5\
             C671085A 1447B52A 48CF1970 B4FB6F84 00BBF4CE BFBB1688 1E1F9A1F\
             2E9FFF5C AD53E5ED 50BDE1F5 DD6F18E1 0C830ED2 D1FBD2B1 A72E1F3A\
             9",
        );
        let b_priv = hex(
            "E487CB59 D31AC550 471E81F0 0F6928E0 1DDA08E9 74A004F4 9E61F5D1\
             05284D20",
        );
        let a_priv = hex(
            "60975527 035CF2AD 1989806F 0407210B C81EDC04 E2762A56 AFD529DD\
             DA2D4393",
        );
        let a_pub = group.g.modpow(&a_priv, &group.n);

        let (b_priv_out, b_pub) =
            super::compute_server_public_value(group, &verifier, Some(b_priv.clone()));
        assert_eq!(b_priv_out, b_priv);
        assert_hex_bounds("B", &upper_hex(&b_pub), "BD0C", "7B58");

        let u = super::compute_u(group, &a_pub, &b_pub);
        assert!(!u.is_zero());
        assert_hex_bounds("u", &upper_hex(&u), "CE38", "F019");

        let premaster = super::compute_premaster(group, &a_pub, &b_priv, &u, &verifier);
        assert_hex_bounds("premaster", &upper_hex(&premaster), "B0DC", "6E5A");

        let master = super::premaster_to_master(group, &premaster);
        assert_hex_bounds("master", &upper_hex_bytes(&master), "573C0D40", "E8632B");

        let m1 = super::generate_m1(group, &salt.to_bytes_be(), &a_pub, &b_pub, &master, None, false);
        assert_hex_bounds("m1", &upper_hex_bytes(&m1), "D67B", "815C");

        let m2 = super::generate_m2(&a_pub, &m1, &master);
        assert_hex_bounds("m2", &upper_hex_bytes(&m2), "53EE", "E820");
    }

    #[test]
    fn zero_public_value_is_rejected() {
        let group = SrpGroup::for_name(SrpGroupName::Small);
        assert!(super::is_invalid_public_value(group, &BigUint::zero()));
        assert!(super::is_invalid_public_value(group, &group.n));
        assert!(!super::is_invalid_public_value(group, &BigUint::from(42u32)));
    }

    #[test]
    fn m1_is_deterministic_for_same_inputs() {
        let group = SrpGroup::for_name(SrpGroupName::Small);
        let salt = vec![1u8; 16];
        let a = BigUint::from(12345u32);
        let b = BigUint::from(67890u32);
        let master = [7u8; 32];
        let m1a = super::generate_m1(group, &salt, &a, &b, &master, None, false);
        let m1b = super::generate_m1(group, &salt, &a, &b, &master, None, false);
        assert_eq!(m1a, m1b);
    }

    #[test]
    fn m1_changes_when_username_mixed_in() {
        let group = SrpGroup::for_name(SrpGroupName::Small);
        let salt = vec![1u8; 16];
        let a = BigUint::from(12345u32);
        let b = BigUint::from(67890u32);
        let master = [7u8; 32];
        let without = super::generate_m1(group, &salt, &a, &b, &master, None, false);
        let with = super::generate_m1(group, &salt, &a, &b, &master, Some("alice"), true);
        assert_ne!(without, with);
    }
}
