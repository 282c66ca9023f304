//! Layered configuration: CLI/env > `config.toml` > built-in defaults.
//!
//! Grounded on the teacher's `config/mod.rs` merge order and its tolerant
//! `load_toml` (a bad TOML file logs and falls back to defaults rather
//! than aborting startup).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

use std::str::FromStr;

use crate::srp::group::SrpGroupName;

const DEFAULT_SESSION_DURATION: u64 = 3600;
const DEFAULT_COMM_CACHE_SIZE: usize = 128;
const DEFAULT_NONCE_CACHE_SIZE: usize = 4096;
const DEFAULT_TIMESTAMP_VALIDITY: u64 = 60;
const DEFAULT_RATE_LIMIT_CAPACITY: u32 = 20;
const DEFAULT_RATE_LIMIT_REFILL_RATE: f64 = 1.0;
const DEFAULT_HANDSHAKE_BUDGET: u64 = 60;

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    session_duration: Option<u64>,
    srp_group: Option<String>,
    comm_cache_size: Option<usize>,
    nonce_cache_size: Option<usize>,
    timestamp_validity: Option<u64>,
    allow_origins: Option<Vec<String>>,
    rate_limit_capacity: Option<u32>,
    rate_limit_refill_rate: Option<f64>,
    vault_folder: Option<PathBuf>,
    database_file: Option<PathBuf>,
    handshake_budget_secs: Option<u64>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── ServerConfig ──────────────────────────────────────────────────────────────

/// CLI/env overrides accepted by the `serve` entry point; each field is
/// `None` unless the user set it explicitly, so it can be layered beneath
/// the TOML file without clobbering it with clap defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub session_duration: Option<u64>,
    pub srp_group: Option<SrpGroupName>,
    pub comm_cache_size: Option<usize>,
    pub nonce_cache_size: Option<usize>,
    pub timestamp_validity: Option<u64>,
    pub allow_origins: Option<Vec<String>>,
    pub rate_limit_capacity: Option<u32>,
    pub rate_limit_refill_rate: Option<f64>,
    pub vault_folder: Option<PathBuf>,
    pub database_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub handshake_budget_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub session_duration: u64,
    pub srp_group: SrpGroupName,
    pub comm_cache_size: usize,
    pub nonce_cache_size: usize,
    pub timestamp_validity: u64,
    pub allow_origins: Vec<String>,
    pub rate_limit_capacity: u32,
    pub rate_limit_refill_rate: f64,
    pub vault_folder: PathBuf,
    pub database_file: PathBuf,
    pub data_dir: PathBuf,

    /// Per-run deadline for the SRP auth channel (spec.md §4.C, §5): a
    /// handshake that hasn't completed within this many seconds is aborted
    /// and leaves no trace — no session registered, no partial state kept.
    pub handshake_budget_secs: u64,

    /// `EXCALIBUR_SERVER_DEBUG`. Gates the debug-only token endpoint and
    /// the `test_verifier`/`test_srp_salt` overrides below.
    pub debug: bool,
    /// `EXCALIBUR_SERVER_ENCRYPT_RESPONSES` (default true). `0` disables
    /// response encryption for local development.
    pub encrypt_responses: bool,
    /// `EXCALIBUR_SERVER_HMAC_ENABLED` (default true). `false` disables
    /// PoP validation for local development.
    pub hmac_enabled: bool,
    /// `EXCALIBUR_SERVER_TEST_VERIFIER`, read only when `debug` is set.
    pub test_verifier: Option<Vec<u8>>,
    /// `EXCALIBUR_SERVER_TEST_SRP_SALT`, read only when `debug` is set.
    pub test_srp_salt: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Build config from CLI/env overrides + optional TOML file.
    pub fn new(overrides: ConfigOverrides) -> Self {
        let data_dir = overrides.data_dir.clone().unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let session_duration = overrides
            .session_duration
            .or(toml.session_duration)
            .unwrap_or(DEFAULT_SESSION_DURATION);

        let srp_group = overrides.srp_group.unwrap_or_else(|| {
            toml.srp_group
                .as_deref()
                .and_then(|s| SrpGroupName::from_str(s).ok())
                .unwrap_or(SrpGroupName::Small)
        });

        let comm_cache_size = overrides
            .comm_cache_size
            .or(toml.comm_cache_size)
            .unwrap_or(DEFAULT_COMM_CACHE_SIZE);
        let nonce_cache_size = overrides
            .nonce_cache_size
            .or(toml.nonce_cache_size)
            .unwrap_or(DEFAULT_NONCE_CACHE_SIZE);
        let timestamp_validity = overrides
            .timestamp_validity
            .or(toml.timestamp_validity)
            .unwrap_or(DEFAULT_TIMESTAMP_VALIDITY);
        let allow_origins = overrides.allow_origins.or(toml.allow_origins).unwrap_or_default();
        let rate_limit_capacity = overrides
            .rate_limit_capacity
            .or(toml.rate_limit_capacity)
            .unwrap_or(DEFAULT_RATE_LIMIT_CAPACITY);
        let rate_limit_refill_rate = overrides
            .rate_limit_refill_rate
            .or(toml.rate_limit_refill_rate)
            .unwrap_or(DEFAULT_RATE_LIMIT_REFILL_RATE);
        let vault_folder = overrides
            .vault_folder
            .or(toml.vault_folder)
            .unwrap_or_else(|| data_dir.join("vault"));
        let database_file = overrides
            .database_file
            .or(toml.database_file)
            .unwrap_or_else(|| data_dir.join("excalibur.db"));
        let handshake_budget_secs = overrides
            .handshake_budget_secs
            .or(toml.handshake_budget_secs)
            .unwrap_or(DEFAULT_HANDSHAKE_BUDGET);

        let debug = std::env::var("EXCALIBUR_SERVER_DEBUG")
            .map(|v| v != "0" && !v.is_empty())
            .unwrap_or(false);
        let encrypt_responses = std::env::var("EXCALIBUR_SERVER_ENCRYPT_RESPONSES")
            .map(|v| v != "0")
            .unwrap_or(true);
        let hmac_enabled = std::env::var("EXCALIBUR_SERVER_HMAC_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let (test_verifier, test_srp_salt) = if debug {
            (
                std::env::var("EXCALIBUR_SERVER_TEST_VERIFIER").ok().and_then(|s| hex::decode(s).ok()),
                std::env::var("EXCALIBUR_SERVER_TEST_SRP_SALT").ok().and_then(|s| hex::decode(s).ok()),
            )
        } else {
            (None, None)
        };

        Self {
            session_duration,
            srp_group,
            comm_cache_size,
            nonce_cache_size,
            timestamp_validity,
            allow_origins,
            rate_limit_capacity,
            rate_limit_refill_rate,
            vault_folder,
            database_file,
            data_dir,
            handshake_budget_secs,
            debug,
            encrypt_responses,
            hmac_enabled,
            test_verifier,
            test_srp_salt,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support").join("excalibur-server");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("excalibur-server");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local").join("share").join("excalibur-server");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("excalibur-server");
        }
    }
    PathBuf::from(".excalibur-server")
}
