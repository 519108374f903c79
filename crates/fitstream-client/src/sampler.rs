//! `FrameSampler` — periodic surface → JPEG → channel loop for one activity.
//!
//! ```text
//! every interval:
//!   token dead?     → exit
//!   gate set?       → skip (frame still outstanding)
//!   no frame yet?   → skip
//!   encode JPEG, set gate, send {tag, image}
//!   send failed?    → clear gate (fail open)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fitstream_capture::Surface;
use fitstream_core::{EncodedFrame, TransportError};
use fitstream_transport_client::StreamChannel;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::encoder::JpegEncoder;
use crate::gate::BackpressureGate;
use crate::liveness::SessionToken;

/// Where sampled frames go.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, tag: &str, frame: &EncodedFrame) -> Result<(), TransportError>;
}

#[async_trait]
impl FrameSink for StreamChannel {
    async fn send_frame(&self, tag: &str, frame: &EncodedFrame) -> Result<(), TransportError> {
        StreamChannel::send_frame(self, tag, frame).await
    }
}

pub struct SamplerParams {
    /// Outbound frame tag of the activity.
    pub tag: &'static str,
    pub interval: Duration,
    pub gate: Arc<BackpressureGate>,
    pub surface: Surface,
    pub encoder: JpegEncoder,
    pub sink: Arc<dyn FrameSink>,
    pub token: SessionToken,
}

pub struct FrameSampler {
    task: Option<JoinHandle<()>>,
    gate: Arc<BackpressureGate>,
    tag: &'static str,
}

impl FrameSampler {
    pub fn start(params: SamplerParams) -> Self {
        let gate = Arc::clone(&params.gate);
        let tag = params.tag;
        info!("Sampler[{}] started ({} ms)", tag, params.interval.as_millis());
        let task = tokio::spawn(run(params));
        Self { task: Some(task), gate, tag }
    }

    /// Cancel the loop and release any outstanding frame. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.gate.clear();
            info!("Sampler[{}] stopped", self.tag);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(params: SamplerParams) {
    let SamplerParams { tag, interval, gate, surface, encoder, sink, token } = params;

    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !token.is_live() {
            debug!("Sampler[{}]: session {} ended, exiting", tag, token.id());
            return;
        }
        if gate.is_set() {
            gate.record_skip();
            trace!("Sampler[{}]: frame outstanding, skipping tick", tag);
            continue;
        }
        let Some(raw) = surface.current() else {
            trace!("Sampler[{}]: no frame on surface yet", tag);
            continue;
        };
        let frame = match encoder.encode(&raw) {
            Ok(f) => f,
            Err(e) => {
                warn!("Sampler[{}]: {}", tag, e);
                continue;
            }
        };
        if !gate.try_set() {
            continue;
        }

        // Detached so cancelling the sampler never truncates a frame on the wire.
        let sink = Arc::clone(&sink);
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            if let Err(e) = sink.send_frame(tag, &frame).await {
                warn!("Sampler[{}]: send failed: {}", tag, e);
                gate.clear();
            }
        });
    }
}
