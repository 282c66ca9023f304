//! Low-level incremental AES-GCM: CTR-mode keystream generation with NIST
//! `inc32` counter semantics, plus GHASH MAC accumulation, across an
//! arbitrary partition of input bytes.
//!
//! Grounded on `original_source`'s `exef/crypto.py` incremental
//! `Encryptor`/`Decryptor` contract (buffer-then-emit via a byte queue).
//! No pack example implements streaming AEAD directly — the one-shot
//! `aes-gcm` crate used elsewhere in the ecosystem (see `DESIGN.md`) cannot
//! express a decryptor that releases ciphertext blocks before the final tag
//! is known — so this module is built from the same lower-level RustCrypto
//! primitives (`aes` + `ghash`) that `aes-gcm` itself composes internally.
//!
//! Keystream blocks and GHASH blocks are generated strictly by absolute
//! byte position in the continuous stream, never per `update()` call: a
//! call that ends mid-block leaves its partially-consumed keystream block
//! (`ks_buf`/`ks_pos`) and its partially-hashed GHASH remainder
//! (`ghash_buf`) pending for the next call. Restarting either per-call
//! would corrupt the stream at any call boundary that isn't 16-byte aligned.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use ghash::{
    universal_hash::{KeyInit as UhKeyInit, UniversalHash},
    GHash,
};

use super::ExefError;

type Block = GenericArray<u8, generic_array::typenum::U16>;

enum BlockCipher {
    Aes128(Box<Aes128>),
    Aes192(Box<Aes192>),
    Aes256(Box<Aes256>),
}

impl BlockCipher {
    fn new(key: &[u8]) -> Result<Self, ExefError> {
        match key.len() {
            16 => Ok(BlockCipher::Aes128(Box::new(Aes128::new(GenericArray::from_slice(key))))),
            24 => Ok(BlockCipher::Aes192(Box::new(Aes192::new(GenericArray::from_slice(key))))),
            32 => Ok(BlockCipher::Aes256(Box::new(Aes256::new(GenericArray::from_slice(key))))),
            _ => Err(ExefError::BadKeysize),
        }
    }

    fn encrypt_block(&self, block: &mut Block) {
        match self {
            BlockCipher::Aes128(c) => c.encrypt_block(block),
            BlockCipher::Aes192(c) => c.encrypt_block(block),
            BlockCipher::Aes256(c) => c.encrypt_block(block),
        }
    }
}

/// Increment only the last 4 bytes of a 16-byte counter block, wrapping on
/// overflow, per NIST SP 800-38D's `inc32`.
fn inc32(block: [u8; 16]) -> [u8; 16] {
    let mut out = block;
    let counter = u32::from_be_bytes([out[12], out[13], out[14], out[15]]);
    out[12..16].copy_from_slice(&counter.wrapping_add(1).to_be_bytes());
    out
}

/// Stateful AES-GCM core shared by the streaming encryptor and decryptor.
/// Both directions XOR identically against the keystream; they differ only
/// in which byte stream (plaintext vs ciphertext) gets fed to GHASH.
pub struct GcmEngine {
    cipher: BlockCipher,
    ghash: GHash,
    j0: [u8; 16],
    counter_block: [u8; 16],
    ks_buf: [u8; 16],
    ks_pos: usize,
    ghash_buf: Vec<u8>,
    ct_bit_len: u64,
}

impl GcmEngine {
    pub fn new(key: &[u8], nonce: &[u8; 12]) -> Result<Self, ExefError> {
        let cipher = BlockCipher::new(key)?;

        let mut h_block: Block = GenericArray::default();
        cipher.encrypt_block(&mut h_block);
        let ghash = GHash::new(&h_block);

        let mut j0 = [0u8; 16];
        j0[..12].copy_from_slice(nonce);
        j0[15] = 1;

        let counter_block = inc32(j0);

        Ok(Self {
            cipher,
            ghash,
            j0,
            counter_block,
            ks_buf: [0u8; 16],
            ks_pos: 16, // forces keystream generation on first byte
            ghash_buf: Vec::with_capacity(16),
            ct_bit_len: 0,
        })
    }

    fn next_keystream_block(&mut self) -> [u8; 16] {
        let mut block: Block = GenericArray::clone_from_slice(&self.counter_block);
        self.cipher.encrypt_block(&mut block);
        self.counter_block = inc32(self.counter_block);
        let mut out = [0u8; 16];
        out.copy_from_slice(&block);
        out
    }

    /// CTR-XOR `input` against the running keystream, in place of a fresh
    /// copy. Works identically for encryption and decryption.
    pub fn apply_keystream(&mut self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len());
        for &byte in input {
            if self.ks_pos == 16 {
                self.ks_buf = self.next_keystream_block();
                self.ks_pos = 0;
            }
            out.push(byte ^ self.ks_buf[self.ks_pos]);
            self.ks_pos += 1;
        }
        out
    }

    /// Feed ciphertext bytes (always ciphertext — GHASH authenticates the
    /// ciphertext stream regardless of direction) into the running MAC.
    pub fn absorb_ciphertext(&mut self, ct_chunk: &[u8]) {
        self.ct_bit_len += ct_chunk.len() as u64 * 8;
        self.ghash_buf.extend_from_slice(ct_chunk);
        while self.ghash_buf.len() >= 16 {
            let block: Vec<u8> = self.ghash_buf.drain(0..16).collect();
            self.ghash.update(std::slice::from_ref(Block::from_slice(&block)));
        }
    }

    /// Finalize: hash the trailing partial block (if any) plus the 16-byte
    /// AAD/ciphertext bit-length block, then mask with `E(K, J0)`.
    pub fn finalize(mut self) -> [u8; 16] {
        if !self.ghash_buf.is_empty() {
            self.ghash.update_padded(&self.ghash_buf);
        }
        let mut len_block = [0u8; 16];
        len_block[8..16].copy_from_slice(&self.ct_bit_len.to_be_bytes());
        self.ghash.update_padded(&len_block);

        let s = self.ghash.finalize();

        let mut ej0: Block = GenericArray::clone_from_slice(&self.j0);
        self.cipher.encrypt_block(&mut ej0);

        let mut tag = [0u8; 16];
        for i in 0..16 {
            tag[i] = s[i] ^ ej0[i];
        }
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(key: &[u8], nonce: [u8; 12], plaintext: &[u8]) -> (Vec<u8>, [u8; 16]) {
        let mut enc = GcmEngine::new(key, &nonce).unwrap();
        let ct = enc.apply_keystream(plaintext);
        enc.absorb_ciphertext(&ct);
        let tag = enc.finalize();
        (ct, tag)
    }

    #[test]
    fn encrypt_decrypt_are_inverses() {
        let key = [3u8; 32];
        let nonce = [7u8; 12];
        let plaintext = b"the quick brown fox jumps over the lazy dog, thirty-five bytes!";

        let (ct, tag) = roundtrip(&key, nonce, plaintext);

        let mut dec = GcmEngine::new(&key, &nonce).unwrap();
        let pt = dec.apply_keystream(&ct);
        dec.absorb_ciphertext(&ct);
        let dec_tag = dec.finalize();

        assert_eq!(pt, plaintext);
        assert_eq!(tag, dec_tag);
    }

    #[test]
    fn chunk_partition_does_not_affect_ciphertext_or_tag() {
        let key = [9u8; 16];
        let nonce = [1u8; 12];
        let plaintext: Vec<u8> = (0..100u8).collect();

        let (whole_ct, whole_tag) = roundtrip(&key, nonce, &plaintext);

        // Feed in an awkward, non-block-aligned partition.
        let mut enc = GcmEngine::new(&key, &nonce).unwrap();
        let mut parts_ct = Vec::new();
        for chunk in [&plaintext[0..5], &plaintext[5..6], &plaintext[6..40], &plaintext[40..100]] {
            let ct_chunk = enc.apply_keystream(chunk);
            enc.absorb_ciphertext(&ct_chunk);
            parts_ct.extend_from_slice(&ct_chunk);
        }
        let parts_tag = enc.finalize();

        assert_eq!(parts_ct, whole_ct);
        assert_eq!(parts_tag, whole_tag);
    }

    #[test]
    fn tampered_ciphertext_changes_tag() {
        let key = [5u8; 24];
        let nonce = [2u8; 12];
        let plaintext = b"some secret bytes";
        let (mut ct, tag) = roundtrip(&key, nonce, plaintext);
        ct[0] ^= 0xFF;

        let mut dec = GcmEngine::new(&key, &nonce).unwrap();
        let _ = dec.apply_keystream(&ct);
        dec.absorb_ciphertext(&ct);
        let bad_tag = dec.finalize();

        assert_ne!(tag, bad_tag);
    }

    #[test]
    fn empty_plaintext_produces_valid_tag() {
        let key = [1u8; 16];
        let nonce = [0u8; 12];
        let (ct, _tag) = roundtrip(&key, nonce, b"");
        assert!(ct.is_empty());
    }
}
