//! mcmgrd entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use mc_mgr::audit::{init_logging, init_logging_pretty};
use mc_mgr::{McMgrConfig, McMgrDaemon};
use tracing::{error, info, warn};

/// Multicast replication tree manager daemon
#[derive(Parser, Debug)]
#[command(name = "mcmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short = 'c', long, default_value = "/etc/sonic/mcmgrd.conf")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Override the configured GC mode (interrupt or periodic)
    #[arg(long)]
    gc_mode: Option<mc_mgr::GcMode>,
}

fn load_config(args: &Args) -> anyhow::Result<McMgrConfig> {
    let mut config = McMgrConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(mode) = args.gc_mode {
        config.gc.mode = mode;
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.json_logs {
        init_logging(&args.log_level);
    } else {
        init_logging_pretty(&args.log_level);
    }

    info!(config = %args.config.display(), "starting mcmgrd");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{:#}", e), "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let daemon = match McMgrDaemon::new(config) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "failed to initialize mcmgrd");
            return ExitCode::FAILURE;
        }
    };

    daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            warn!("received SIGINT, shutting down");
        })
        .await;

    info!("mcmgrd shutdown complete");
    ExitCode::SUCCESS
}
