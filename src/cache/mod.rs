//! Bounded, concurrent, TTL-backed caches shared by every request handler
//! (spec.md §4.D): the session cache (uuid → master key) and the PoP
//! nonce cache (nonce → seen-once marker).
//!
//! `moka`'s future cache gives linearizable inserts/reads and expiry-aware
//! eviction for free, which is what the teacher's daemon likewise reaches
//! for whenever it needs a bounded concurrent map.

use moka::future::Cache;
use std::time::Duration;

/// Maps a live auth-channel session UUID to its 32-byte SRP master key.
#[derive(Clone)]
pub struct SessionCache {
    inner: Cache<String, [u8; 32]>,
}

impl SessionCache {
    pub fn new(capacity: u64, ttl_secs: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { inner }
    }

    pub async fn put(&self, uuid: String, master_key: [u8; 32]) {
        self.inner.insert(uuid, master_key).await;
    }

    pub async fn get(&self, uuid: &str) -> Option<[u8; 32]> {
        self.inner.get(uuid).await
    }

    pub fn invalidate(&self, uuid: &str) {
        self.inner.invalidate(uuid);
    }
}

/// Tracks PoP nonces seen within the clock-skew validity window, to reject
/// replays.
#[derive(Clone)]
pub struct NonceCache {
    inner: Cache<Vec<u8>, ()>,
}

impl NonceCache {
    pub fn new(capacity: u64, ttl_secs: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { inner }
    }

    pub fn contains(&self, nonce: &[u8]) -> bool {
        self.inner.contains_key(nonce)
    }

    pub async fn insert(&self, nonce: Vec<u8>) {
        self.inner.insert(nonce, ()).await;
    }
}
