//! Camera relay binary.
//!
//! Drives a VC0706 serial camera and relays captured JPEG frames to a
//! remote host over TCP. `snap` takes a single picture; `run` captures
//! on a fixed interval until interrupted.

mod config;
mod pipeline;
mod uploader;

use anyhow::Context;
use cam_driver_vc0706::Vc0706Camera;
use clap::{Parser, Subcommand};
use config::RelayConfig;
use pipeline::snapshot_and_upload;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uploader::TcpUploader;

#[derive(Parser)]
#[command(name = "cam-relay", about = "VC0706 camera snapshot relay", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "cam-relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture one snapshot, upload it, and exit.
    Snap {
        /// Also write the image to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Capture and upload on a fixed interval until Ctrl-C.
    Run,
}

fn init_tracing(level: &str) {
    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = RelayConfig::load_from(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    cfg.validate()?;
    init_tracing(&cfg.log.level);

    info!(port = %cfg.camera.port, upload = %cfg.upload.addr, "starting relay");

    let mut camera = Vc0706Camera::open(&cfg.camera)
        .await
        .context("opening camera")?;
    let uploader = TcpUploader::new(cfg.upload.addr.clone());

    match cli.command {
        Command::Snap { output } => {
            let image = snapshot_and_upload(&mut camera, &uploader).await?;
            if let Some(path) = output {
                tokio::fs::write(&path, &image)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), bytes = image.len(), "image written");
            }
        }
        Command::Run => run_loop(&mut camera, &uploader, cfg.capture.interval_secs).await,
    }

    Ok(())
}

/// Capture on a fixed cadence. Individual failures are logged and the
/// loop moves on; retrying within a cycle is left to the operator's
/// schedule rather than attempted here.
async fn run_loop(camera: &mut Vc0706Camera, uploader: &TcpUploader, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match snapshot_and_upload(camera, uploader).await {
                    Ok(image) => info!(bytes = image.len(), "cycle complete"),
                    Err(e) => error!(error = %e, "cycle failed"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "ctrl-c handler failed, stopping");
                }
                info!("shutting down");
                break;
            }
        }
    }
}
