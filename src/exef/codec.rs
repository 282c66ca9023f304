//! Public ExEF API: one-shot `encrypt`/`decrypt` and the streaming
//! `StreamEncryptor`/`StreamDecryptor` pair used by the route-encryption
//! middleware (spec.md §4.A, §4.F).
//!
//! Mirrors `original_source`'s `exef/exef.py` convenience wrappers and the
//! queue-based `Encryptor`/`Decryptor` contract in `exef/crypto.py`: a
//! streaming consumer calls `get()` repeatedly and receives the header
//! exactly once, then ciphertext/plaintext chunks in order, then the
//! footer exactly once, once `fully_processed()` is true.

use rand::RngCore;
use std::collections::VecDeque;
use subtle::ConstantTimeEq;

use super::gcm::GcmEngine;
use super::structures::{keysize_bits_for, Footer, Header, EXEF_FOOTER_LEN, EXEF_HEADER_LEN};
use super::ExefError;

fn random_nonce() -> [u8; 12] {
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// One-shot encryption: `header || ciphertext || tag`.
pub fn encrypt(key: &[u8], nonce: Option<[u8; 12]>, plaintext: &[u8]) -> Result<Vec<u8>, ExefError> {
    let nonce = nonce.unwrap_or_else(random_nonce);
    let keysize = keysize_bits_for(key.len())?;

    let mut engine = GcmEngine::new(key, &nonce)?;
    let ciphertext = engine.apply_keystream(plaintext);
    engine.absorb_ciphertext(&ciphertext);
    let tag = engine.finalize();

    let header = Header::new(keysize, nonce, plaintext.len() as u64);
    let mut out = Vec::with_capacity(EXEF_HEADER_LEN + ciphertext.len() + EXEF_FOOTER_LEN);
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    Ok(out)
}

/// One-shot decryption. Verifies the tag before returning plaintext.
pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ExefError> {
    let header = Header::from_bytes(data)?;
    keysize_bits_for(key.len())?;
    if header.keysize != (key.len() as u16) * 8 {
        return Err(ExefError::BadKeysize);
    }

    let ct_len = header.ct_len as usize;
    let total = EXEF_HEADER_LEN + ct_len + EXEF_FOOTER_LEN;
    if data.len() < total {
        return Err(ExefError::ShortBuffer);
    }
    let ciphertext = &data[EXEF_HEADER_LEN..EXEF_HEADER_LEN + ct_len];
    let footer = Footer::from_bytes(&data[EXEF_HEADER_LEN + ct_len..total])?;

    let mut engine = GcmEngine::new(key, &header.nonce)?;
    let plaintext = engine.apply_keystream(ciphertext);
    engine.absorb_ciphertext(ciphertext);
    let tag = engine.finalize();

    if bool::from(tag.ct_eq(&footer.tag)) {
        Ok(plaintext)
    } else {
        Err(ExefError::TagMismatch)
    }
}

/// Incremental encryptor. `set_params` must be called once, before any
/// `update`, because the header cannot be emitted without `ct_len`.
pub struct StreamEncryptor {
    key: Vec<u8>,
    forced_nonce: Option<[u8; 12]>,
    total_len: Option<u64>,
    consumed: u64,
    engine: Option<GcmEngine>,
    queue: VecDeque<Vec<u8>>,
    done: bool,
}

impl StreamEncryptor {
    pub fn new(key: Vec<u8>) -> Self {
        Self {
            key,
            forced_nonce: None,
            total_len: None,
            consumed: 0,
            engine: None,
            queue: VecDeque::new(),
            done: false,
        }
    }

    /// Construct with a caller-supplied nonce. Used only by tests that need
    /// deterministic output — production code must let the nonce be drawn
    /// at random (spec.md §4.A nonce policy).
    pub fn with_fixed_nonce(key: Vec<u8>, nonce: [u8; 12]) -> Self {
        let mut s = Self::new(key);
        s.forced_nonce = Some(nonce);
        s
    }

    /// Must be called exactly once, before the first `update`.
    pub fn set_params(&mut self, total_len: u64) -> Result<(), ExefError> {
        assert!(self.engine.is_none() && self.total_len.is_none(), "set_params called twice");
        let keysize = keysize_bits_for(self.key.len())?;
        let nonce = self.forced_nonce.unwrap_or_else(random_nonce);

        self.queue.push_back(Header::new(keysize, nonce, total_len).to_bytes().to_vec());
        self.engine = Some(GcmEngine::new(&self.key, &nonce)?);
        self.total_len = Some(total_len);

        if total_len == 0 {
            let engine = self.engine.take().unwrap();
            self.queue.push_back(engine.finalize().to_vec());
            self.done = true;
        }
        Ok(())
    }

    /// Feed the next chunk of plaintext, in any partition.
    pub fn update(&mut self, chunk: &[u8]) -> Result<(), ExefError> {
        let total_len = self.total_len.expect("set_params must be called before update");
        if self.done {
            return Ok(());
        }
        let engine = self.engine.as_mut().expect("set_params must be called before update");

        let ciphertext = engine.apply_keystream(chunk);
        engine.absorb_ciphertext(&ciphertext);
        self.consumed += chunk.len() as u64;
        self.queue.push_back(ciphertext);

        if self.consumed >= total_len {
            let engine = self.engine.take().unwrap();
            self.queue.push_back(engine.finalize().to_vec());
            self.done = true;
        }
        Ok(())
    }

    /// Pop the next ready output chunk (header, ciphertext chunk, or
    /// footer), if any is queued.
    pub fn get(&mut self) -> Option<Vec<u8>> {
        self.queue.pop_front()
    }

    pub fn fully_processed(&self) -> bool {
        self.done && self.queue.is_empty()
    }
}

/// Incremental decryptor. Accepts an arbitrary byte partition; buffers
/// until the header is complete, then decrypts ciphertext bytes as they
/// arrive, then buffers the trailing footer. `verify()` must be called
/// once all input has been fed.
pub struct StreamDecryptor {
    key: Vec<u8>,
    buf: Vec<u8>,
    header: Option<Header>,
    engine: Option<GcmEngine>,
    ct_consumed: u64,
    queue: VecDeque<Vec<u8>>,
    tag_buf: Vec<u8>,
}

impl StreamDecryptor {
    pub fn new(key: Vec<u8>) -> Self {
        Self {
            key,
            buf: Vec::new(),
            header: None,
            engine: None,
            ct_consumed: 0,
            queue: VecDeque::new(),
            tag_buf: Vec::with_capacity(EXEF_FOOTER_LEN),
        }
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Feed the next chunk of container bytes, in any partition.
    pub fn update(&mut self, chunk: &[u8]) -> Result<(), ExefError> {
        self.buf.extend_from_slice(chunk);

        if self.header.is_none() {
            if self.buf.len() < EXEF_HEADER_LEN {
                return Ok(());
            }
            let header = Header::from_bytes(&self.buf[..EXEF_HEADER_LEN])?;
            if header.keysize != (self.key.len() as u16) * 8 {
                return Err(ExefError::BadKeysize);
            }
            self.engine = Some(GcmEngine::new(&self.key, &header.nonce)?);
            self.buf.drain(0..EXEF_HEADER_LEN);
            self.header = Some(header);
        }

        let ct_len = self.header.as_ref().unwrap().ct_len;
        let remaining_ct = ct_len.saturating_sub(self.ct_consumed);
        if remaining_ct > 0 && !self.buf.is_empty() {
            let take = (remaining_ct as usize).min(self.buf.len());
            let ciphertext: Vec<u8> = self.buf.drain(0..take).collect();
            let engine = self.engine.as_mut().unwrap();
            let plaintext = engine.apply_keystream(&ciphertext);
            engine.absorb_ciphertext(&ciphertext);
            self.ct_consumed += take as u64;
            self.queue.push_back(plaintext);
        }

        if self.ct_consumed == ct_len && !self.buf.is_empty() {
            self.tag_buf.extend_from_slice(&self.buf);
            self.buf.clear();
        }

        Ok(())
    }

    /// Pop the next ready plaintext chunk, if any is queued.
    pub fn get(&mut self) -> Option<Vec<u8>> {
        self.queue.pop_front()
    }

    /// `true` once all `ct_len` ciphertext bytes have been consumed and
    /// emitted as plaintext.
    pub fn fully_processed(&self) -> bool {
        matches!(&self.header, Some(h) if self.ct_consumed == h.ct_len) && self.queue.is_empty()
    }

    /// Verify the GCM tag. Must be called after all input has been fed via
    /// `update`. Consumes the internal cipher state.
    pub fn verify(&mut self) -> Result<(), ExefError> {
        let header = self.header.as_ref().ok_or(ExefError::ShortBuffer)?;
        if self.ct_consumed != header.ct_len || self.tag_buf.len() < EXEF_FOOTER_LEN {
            return Err(ExefError::ShortBuffer);
        }
        let footer = Footer::from_bytes(&self.tag_buf[..EXEF_FOOTER_LEN])?;
        let engine = self.engine.take().ok_or(ExefError::ShortBuffer)?;
        let computed = engine.finalize();

        if bool::from(computed.ct_eq(&footer.tag)) {
            Ok(())
        } else {
            Err(ExefError::TagMismatch)
        }
    }
}
