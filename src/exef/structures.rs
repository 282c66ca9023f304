//! Header and footer binary layout — see spec.md §3.
//!
//! ```text
//! offset  size  field
//! 0       4     magic    "ExEF"
//! 4       2     version  = 0x0002
//! 6       2     keysize  in bits (128|192|256)
//! 8       12    nonce    (AES-GCM IV)
//! 20      8     ct_len   ciphertext length in bytes
//! 28      ct_len ciphertext
//! 28+ct_len 16  tag      AES-GCM authentication tag
//! ```
//!
//! Mirrors `original_source`'s `exef/structures.py` `Header`/`Footer`
//! pydantic models, translated to plain big-endian byte slicing.

use super::ExefError;

pub const EXEF_MAGIC: [u8; 4] = *b"ExEF";
pub const EXEF_VERSION: u16 = 2;
pub const EXEF_HEADER_LEN: usize = 28;
pub const EXEF_FOOTER_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub keysize: u16,
    pub nonce: [u8; NONCE_LEN],
    pub ct_len: u64,
}

impl Header {
    pub fn new(keysize_bits: u16, nonce: [u8; NONCE_LEN], ct_len: u64) -> Self {
        Self {
            version: EXEF_VERSION,
            keysize: keysize_bits,
            nonce,
            ct_len,
        }
    }

    pub fn to_bytes(&self) -> [u8; EXEF_HEADER_LEN] {
        let mut buf = [0u8; EXEF_HEADER_LEN];
        buf[0..4].copy_from_slice(&EXEF_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_be_bytes());
        buf[6..8].copy_from_slice(&self.keysize.to_be_bytes());
        buf[8..20].copy_from_slice(&self.nonce);
        buf[20..28].copy_from_slice(&self.ct_len.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, ExefError> {
        if buf.len() < EXEF_HEADER_LEN {
            return Err(ExefError::ShortBuffer);
        }
        if buf[0..4] != EXEF_MAGIC {
            return Err(ExefError::BadMagic);
        }
        let version = u16::from_be_bytes([buf[4], buf[5]]);
        if version != EXEF_VERSION {
            return Err(ExefError::BadVersion);
        }
        let keysize = u16::from_be_bytes([buf[6], buf[7]]);
        if !matches!(keysize, 128 | 192 | 256) {
            return Err(ExefError::BadKeysize);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buf[8..20]);
        let ct_len = u64::from_be_bytes(buf[20..28].try_into().unwrap());
        Ok(Self { version, keysize, nonce, ct_len })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub tag: [u8; EXEF_FOOTER_LEN],
}

impl Footer {
    pub fn to_bytes(&self) -> [u8; EXEF_FOOTER_LEN] {
        self.tag
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, ExefError> {
        if buf.len() < EXEF_FOOTER_LEN {
            return Err(ExefError::ShortBuffer);
        }
        let mut tag = [0u8; EXEF_FOOTER_LEN];
        tag.copy_from_slice(&buf[..EXEF_FOOTER_LEN]);
        Ok(Self { tag })
    }
}

/// Maps a raw AES key's byte length onto the wire `keysize` field (bits).
pub fn keysize_bits_for(key_len: usize) -> Result<u16, ExefError> {
    match key_len {
        16 => Ok(128),
        24 => Ok(192),
        32 => Ok(256),
        _ => Err(ExefError::BadKeysize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = Header::new(256, [9u8; NONCE_LEN], 1234);
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), EXEF_HEADER_LEN);
        let parsed = Header::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = Header::new(128, [0u8; NONCE_LEN], 0).to_bytes();
        bytes[0] = b'X';
        assert_eq!(Header::from_bytes(&bytes).unwrap_err(), ExefError::BadMagic);
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut bytes = Header::new(128, [0u8; NONCE_LEN], 0).to_bytes();
        bytes[4..6].copy_from_slice(&99u16.to_be_bytes());
        assert_eq!(Header::from_bytes(&bytes).unwrap_err(), ExefError::BadVersion);
    }

    #[test]
    fn bad_keysize_is_rejected() {
        let mut bytes = Header::new(128, [0u8; NONCE_LEN], 0).to_bytes();
        bytes[6..8].copy_from_slice(&111u16.to_be_bytes());
        assert_eq!(Header::from_bytes(&bytes).unwrap_err(), ExefError::BadKeysize);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert_eq!(Header::from_bytes(&[0u8; 10]).unwrap_err(), ExefError::ShortBuffer);
        assert_eq!(Footer::from_bytes(&[0u8; 4]).unwrap_err(), ExefError::ShortBuffer);
    }

    #[test]
    fn keysize_mapping() {
        assert_eq!(keysize_bits_for(16).unwrap(), 128);
        assert_eq!(keysize_bits_for(24).unwrap(), 192);
        assert_eq!(keysize_bits_for(32).unwrap(), 256);
        assert!(keysize_bits_for(20).is_err());
    }
}
