//! # verifierd entry point
//!
//! Parses command-line arguments, installs logging, loads configuration
//! and hands over to the daemon. Any fatal error exits with status 1 so
//! that the supervisor restarts the process, which re-runs crash recovery.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use verifier_cli::config::DaemonConfig;
use verifier_cli::daemon::run_daemon;

/// Image verifier daemon.
///
/// Moves downloaded application and base-OS images into an immutable,
/// content-addressed store once their digest and optional signature have
/// been verified.
#[derive(Parser, Debug)]
#[command(name = "verifierd", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Path to a YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the object store root.
    #[arg(long)]
    object_root: Option<PathBuf>,

    /// Override the status root.
    #[arg(long)]
    status_root: Option<PathBuf>,

    /// Override the config root.
    #[arg(long)]
    config_root: Option<PathBuf>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut DaemonConfig) {
        if let Some(root) = &self.object_root {
            config.object_root = root.clone();
        }
        if let Some(root) = &self.status_root {
            config.status_root = root.clone();
        }
        if let Some(root) = &self.config_root {
            config.config_root = root.clone();
        }
    }
}

fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    tracing::debug!("verifierd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match DaemonConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(1);
        }
    };
    cli.apply_overrides(&mut config);

    match run_daemon(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
