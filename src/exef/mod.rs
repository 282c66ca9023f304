//! ExEF (Excalibur Encryption Format) — the AES-GCM container every
//! encrypted request/response body and every vault file is framed in.
//!
//! `structures` defines the wire layout, `gcm` is the low-level incremental
//! AES-GCM primitive (CTR keystream + GHASH, built from scratch because the
//! one-shot `aes-gcm` crate API cannot express arbitrary-chunk streaming),
//! and `codec` is the public one-shot and streaming API built on top.

pub mod codec;
pub mod gcm;
pub mod structures;

pub use codec::{decrypt, encrypt, StreamDecryptor, StreamEncryptor};
pub use structures::{Footer, Header, EXEF_FOOTER_LEN, EXEF_HEADER_LEN, EXEF_VERSION};

/// Failure modes for container decode/decrypt, named directly in spec.md §4.A.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExefError {
    #[error("bad magic bytes")]
    BadMagic,
    #[error("unsupported ExEF version")]
    BadVersion,
    #[error("unsupported key size")]
    BadKeysize,
    #[error("buffer shorter than header/footer")]
    ShortBuffer,
    #[error("GCM authentication tag mismatch")]
    TagMismatch,
}
