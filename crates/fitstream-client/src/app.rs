//! Wiring for the `fitstream` binary: build a controller from config, then
//! drive it from line commands and timer events until quit, Ctrl-C or SIGTERM.

use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use fitstream_capture::{CameraBackend, CameraCapturer};
use fitstream_core::{Activity, ClientConfig};
use fitstream_transport_client::{HttpSessionApi, StreamChannel};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::context::StreamingContext;
use crate::controller::{ControlEvent, ControllerSettings, SessionController};
use crate::display::ConsoleDisplay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    Status,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown command '{0}' (start, stop, reset, status, quit)")]
pub struct ParseCommandError(pub String);

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "s" => Ok(Self::Start),
            "stop" | "x" => Ok(Self::Stop),
            "reset" | "r" => Ok(Self::Reset),
            "status" | "?" => Ok(Self::Status),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(ParseCommandError(other.to_owned())),
        }
    }
}

/// Connect to the analysis service and build an Idle controller.
pub async fn connect(
    config: &ClientConfig,
    activity: Activity,
    frame_out: Option<PathBuf>,
) -> Result<(SessionController, mpsc::UnboundedReceiver<ControlEvent>)> {
    let backend = config.capture.camera.parse::<CameraBackend>().unwrap_or(CameraBackend::TestPattern);
    let api = HttpSessionApi::new(&config.server_url, config.session.request_timeout())
        .context("creating session API client")?;
    let channel = StreamChannel::connect(&config.channel_addr, config.tls)
        .await
        .with_context(|| format!("connecting stream channel to {}", config.channel_addr))?;

    info!("Camera backend: {:?}", backend);
    let ctx = StreamingContext::new(Box::new(CameraCapturer::new(backend)), Arc::new(channel));
    Ok(SessionController::new(
        activity,
        ctx,
        Arc::new(api),
        Arc::new(ConsoleDisplay::new(frame_out)),
        ControllerSettings::from(config),
    ))
}

/// Run commands from `input` until `quit`, end of input, Ctrl-C or SIGTERM,
/// then shut the controller down.
pub async fn run<R>(
    controller: &mut SessionController,
    events: mpsc::UnboundedReceiver<ControlEvent>,
    input: R,
    auto_start: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    run_until(controller, events, input, auto_start, shutdown_signal()).await
}

/// [`run`] with a caller-supplied stop trigger in place of process signals.
pub async fn run_until<R, S>(
    controller: &mut SessionController,
    mut events: mpsc::UnboundedReceiver<ControlEvent>,
    input: R,
    auto_start: bool,
    stop: S,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    if auto_start {
        if let Err(e) = controller.start().await {
            warn!("Auto-start failed: {}", e);
        }
    }

    let mut lines = input.lines();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading commands")? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(cmd) => execute(controller, cmd).await,
                    Err(e) => warn!("{}", e),
                }
            }
            Some(event) = events.recv() => {
                controller.handle_event(event).await;
            }
            () = &mut stop => break,
        }
    }

    controller.shutdown().await;
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted"),
            Err(e) => {
                warn!("Ctrl-C handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        () = interrupt => {}
        () = terminated() => {}
    }
}

#[cfg(unix)]
async fn terminated() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
            info!("Terminated");
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending::<()>().await;
}

async fn execute(controller: &mut SessionController, cmd: Command) {
    match cmd {
        Command::Start => {
            if let Err(e) = controller.start().await {
                warn!("Start failed: {}", e);
            }
        }
        Command::Stop => controller.stop().await,
        Command::Reset => {
            if let Err(e) = controller.reset().await {
                warn!("Reset failed: {}", e);
            }
        }
        Command::Status => {
            let gate = controller.gate_stats();
            println!(
                "{}: {} | time {} | frames sent {} skipped {} answered {}",
                controller.activity(),
                controller.state(),
                controller.timer().formatted(),
                gate.sent,
                gate.skipped,
                gate.cleared,
            );
        }
        Command::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("start".parse::<Command>().unwrap(), Command::Start);
        assert_eq!(" STOP ".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!("q".parse::<Command>().unwrap(), Command::Quit);
        assert!("jump".parse::<Command>().is_err());
    }
}
