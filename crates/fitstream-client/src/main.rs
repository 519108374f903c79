//! FitStream client.
//!
//! Streams webcam frames to the analysis service for one activity and runs
//! a timed session, driven by commands on stdin:
//!
//! ```text
//! $ fitstream --activity jump --server http://10.0.0.2:5000 --channel 10.0.0.2:5001
//! start      begin a session (camera on, frames streaming, 3:00 countdown)
//! stop       end the session
//! reset      stop if running and zero the counters
//! status     print state, remaining time and frame counters
//! quit       clean up and exit (Ctrl-C and SIGTERM do the same)
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fitstream_client::app;
use fitstream_core::{Activity, ClientConfig};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fitstream", version)]
#[command(about = "Stream camera frames to the FitStream analysis service")]
struct Args {
    #[arg(short, long, default_value = "dumbbell",
          help = "Activity: dumbbell, jump, height_weight or situp")]
    activity: Activity,

    #[arg(short, long, help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Session-management base URL")]
    server: Option<String>,

    #[arg(long, help = "Stream channel address (host:port)")]
    channel: Option<String>,

    #[arg(long, help = "Use TLS on the stream channel")]
    tls: bool,

    #[arg(long, help = "Camera: 'test' or a V4L2 device path")]
    camera: Option<String>,

    #[arg(long, help = "Write the latest processed frame to this JPEG file")]
    frame_out: Option<PathBuf>,

    #[arg(long, help = "Start a session immediately")]
    auto_start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("FitStream client v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let mut config = ClientConfig::load(args.config.as_deref()).context("loading configuration")?;
    config.apply_env();
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if let Some(channel) = args.channel {
        config.channel_addr = channel;
    }
    if args.tls {
        config.tls = true;
    }
    if let Some(camera) = args.camera {
        config.capture.camera = camera;
    }
    config.validate().context("validating configuration")?;

    info!(
        "Activity {} → session API {}, stream channel {} (tls={})",
        args.activity, config.server_url, config.channel_addr, config.tls
    );

    let (mut controller, events) = app::connect(&config, args.activity, args.frame_out).await?;
    app::run(&mut controller, events, BufReader::new(tokio::io::stdin()), args.auto_start).await?;

    info!("Bye");
    Ok(())
}
