use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use excalibur_server::config::{ConfigOverrides, ServerConfig};
use excalibur_server::server;
use excalibur_server::srp::group::SrpGroupName;

#[derive(Parser)]
#[command(name = "excalibur-server", about = "Excalibur Server — end-to-end-encrypted personal vault backend", version)]
struct Args {
    /// Data directory for config.toml, the SQLite database, and the vault folder.
    #[arg(long, env = "EXCALIBUR_SERVER_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "EXCALIBUR_SERVER_LOG", default_value = "info")]
    log: String,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "EXCALIBUR_SERVER_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,

    /// SRP safe-prime group: small (1024-bit), medium (1536-bit), large (2048-bit).
    #[arg(long, env = "EXCALIBUR_SERVER_SRP_GROUP")]
    srp_group: Option<String>,

    /// Live session lifetime in seconds.
    #[arg(long, env = "EXCALIBUR_SERVER_SESSION_DURATION")]
    session_duration: Option<u64>,

    /// Per-run deadline for the SRP auth channel, in seconds.
    #[arg(long, env = "EXCALIBUR_SERVER_HANDSHAKE_BUDGET")]
    handshake_budget: Option<u64>,
}

fn setup_logging(log_level: &str, log_file: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("excalibur-server.log"));

        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("warn: could not create log directory '{}': {e} — falling back to stdout", dir.display());
            tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(log_level))
            .with(tracing_subscriber::fmt::layer().compact())
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(&args.log, args.log_file.as_deref());

    let srp_group = args.srp_group.as_deref().and_then(|s| match SrpGroupName::from_str(s) {
        Ok(group) => Some(group),
        Err(_) => {
            eprintln!("warn: unknown --srp-group '{s}' — falling back to config/default");
            None
        }
    });

    let overrides = ConfigOverrides {
        data_dir: args.data_dir,
        srp_group,
        session_duration: args.session_duration,
        handshake_budget_secs: args.handshake_budget,
        ..Default::default()
    };
    let config = ServerConfig::new(overrides);

    server::run(config).await
}
