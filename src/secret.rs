//! The process-wide server secret (spec.md §3, §5): generated once, then
//! persisted so bearer tokens remain valid across restarts.
//!
//! Grounded on the teacher's `identity::get_or_create` pattern — look up a
//! `settings` row, and if absent, generate and persist one atomically.

use anyhow::Result;
use rand::RngCore;
use tracing::info;

use crate::storage::Storage;

const SETTING_KEY: &str = "server_secret";
const SECRET_LEN: usize = 32;

/// Loads the persisted server secret, or generates, persists, and returns a
/// fresh one on first run.
pub async fn get_or_create(storage: &Storage) -> Result<Vec<u8>> {
    if let Some(hex_secret) = storage.get_setting(SETTING_KEY).await? {
        return Ok(hex::decode(hex_secret)?);
    }

    let mut secret = vec![0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    storage.set_setting(SETTING_KEY, &hex::encode(&secret)).await?;
    info!("generated new server secret");
    Ok(secret)
}
