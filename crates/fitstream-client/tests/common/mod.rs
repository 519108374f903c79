//! Shared fakes: session API, camera, and an in-memory analysis server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fitstream_capture::{CaptureConstraints, CaptureSource, FrameSlot, RawFrame, Surface};
use fitstream_client::{
    ControlEvent, ControllerSettings, MemoryDisplay, SessionController, StreamingContext,
};
use fitstream_core::{Activity, CaptureError, Resolution, TransportError};
use fitstream_transport_client::wire::{read_msg, write_msg};
use fitstream_transport_client::{InboundMessage, OutboundFrame, SessionApi, SessionReply, StreamChannel};
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::sync::{mpsc, watch};

// ── Session API ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSessionApi {
    pub begin_reply: Mutex<Option<SessionReply>>,
    pub fail_end: AtomicBool,
    pub fail_reset: AtomicBool,
    pub fail_cleanup: AtomicBool,
    /// `cleanup` never completes.
    pub hang_cleanup: AtomicBool,
    pub stats: Mutex<Value>,
    pub begin_calls: AtomicUsize,
    pub end_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,
}

impl FakeSessionApi {
    pub fn reject_begin(&self, message: &str) {
        *self.begin_reply.lock().unwrap() = Some(SessionReply::error(message));
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionApi for FakeSessionApi {
    async fn begin(&self, _: Activity) -> Result<SessionReply, TransportError> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.begin_reply.lock().unwrap().clone().unwrap_or_else(|| SessionReply::success("Started")))
    }

    async fn end(&self, _: Activity) -> Result<SessionReply, TransportError> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_end.load(Ordering::SeqCst) {
            return Err(TransportError::RequestFailed { reason: "connection refused".into() });
        }
        Ok(SessionReply::success("Stopped"))
    }

    async fn reset_counters(&self, _: Activity) -> Result<SessionReply, TransportError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reset.load(Ordering::SeqCst) {
            return Ok(SessionReply::error("reset failed"));
        }
        Ok(SessionReply::success("Reset"))
    }

    async fn get_stats(&self, _: Activity) -> Result<Value, TransportError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stats.lock().unwrap().clone())
    }

    async fn cleanup(&self, _: Activity) -> Result<(), TransportError> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_cleanup.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_cleanup.load(Ordering::SeqCst) {
            return Err(TransportError::RequestFailed { reason: "connection refused".into() });
        }
        Ok(())
    }
}

// ── Camera ────────────────────────────────────────────────────────────────────

/// Observable side of a [`FakeCamera`].
#[derive(Default)]
pub struct CameraSpy {
    pub deny: AtomicBool,
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
    pub acquired: AtomicBool,
}

impl CameraSpy {
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::SeqCst)
    }
}

/// Serves one static frame, or refuses with `PermissionDenied`.
pub struct FakeCamera {
    spy: Arc<CameraSpy>,
    tx: Option<watch::Sender<FrameSlot>>,
}

impl FakeCamera {
    pub fn new(spy: Arc<CameraSpy>) -> Self {
        Self { spy, tx: None }
    }
}

#[async_trait]
impl CaptureSource for FakeCamera {
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<Surface, CaptureError> {
        if self.spy.deny.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied { reason: "denied by user".into() });
        }
        if self.tx.is_some() {
            return Err(CaptureError::DeviceUnavailable { reason: "already acquired".into() });
        }
        let (w, h) = (constraints.width, constraints.height);
        let frame = RawFrame { data: vec![100; (w * h * 3) as usize], width: w, height: h, pts_ms: 0 };
        let (tx, rx) = watch::channel::<FrameSlot>(Some(Arc::new(frame)));
        self.tx = Some(tx);
        self.spy.acquires.fetch_add(1, Ordering::SeqCst);
        self.spy.acquired.store(true, Ordering::SeqCst);
        Ok(Surface::from_watch(rx, Resolution::new(w, h), constraints.negotiated_fps()))
    }

    fn release(&mut self) {
        if self.tx.take().is_some() {
            self.spy.releases.fetch_add(1, Ordering::SeqCst);
            self.spy.acquired.store(false, Ordering::SeqCst);
        }
    }

    fn is_acquired(&self) -> bool {
        self.tx.is_some()
    }
}

// ── Analysis server ───────────────────────────────────────────────────────────

/// Server end of a duplex stream channel.
pub struct FakeServer {
    pub frames: mpsc::UnboundedReceiver<OutboundFrame>,
    writer: tokio::sync::Mutex<WriteHalf<DuplexStream>>,
}

impl FakeServer {
    pub async fn reply(&self, msg: &InboundMessage) {
        let mut w = self.writer.lock().await;
        write_msg(&mut *w, msg).await.expect("server write");
    }

    pub async fn processed(&self, activity: Activity, stats: Value) {
        let msg = InboundMessage::processed(activity.processed_event(), "data:image/jpeg;base64,/9j/2Q==", stats);
        self.reply(&msg).await;
    }

    pub async fn error(&self, message: &str) {
        self.reply(&InboundMessage::error(message)).await;
    }

    /// Close the server's write side; the client sees end of stream.
    pub async fn hang_up(&self) {
        let mut w = self.writer.lock().await;
        w.shutdown().await.expect("server shutdown");
    }

    pub fn received(&mut self) -> Vec<OutboundFrame> {
        let mut out = Vec::new();
        while let Ok(f) = self.frames.try_recv() {
            out.push(f);
        }
        out
    }
}

pub fn channel_pair() -> (Arc<StreamChannel>, FakeServer) {
    let (client, server) = tokio::io::duplex(1 << 20);
    let (mut reader, writer) = tokio::io::split(server);
    let (tx, frames) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok(frame) = read_msg::<OutboundFrame>(&mut reader).await {
            if tx.send(frame).is_err() {
                break;
            }
        }
    });
    let channel = Arc::new(StreamChannel::from_stream(client, "fake-server"));
    (channel, FakeServer { frames, writer: tokio::sync::Mutex::new(writer) })
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub fn settings() -> ControllerSettings {
    let mut s = ControllerSettings::default();
    s.constraints.width = 32;
    s.constraints.height = 24;
    s.cleanup_timeout = Duration::from_millis(200);
    s
}

pub struct Harness {
    pub controller: SessionController,
    pub events: mpsc::UnboundedReceiver<ControlEvent>,
    pub ctx: Arc<StreamingContext>,
    pub api: Arc<FakeSessionApi>,
    pub camera: Arc<CameraSpy>,
    pub display: Arc<MemoryDisplay>,
    pub server: FakeServer,
}

impl Harness {
    pub fn new(activity: Activity) -> Self {
        let (channel, server) = channel_pair();
        let camera = Arc::new(CameraSpy::default());
        let ctx = StreamingContext::new(Box::new(FakeCamera::new(Arc::clone(&camera))), channel);
        let api = Arc::new(FakeSessionApi::default());
        *api.stats.lock().unwrap() = json!({});
        let display = Arc::new(MemoryDisplay::new());
        let (controller, events) =
            SessionController::new(activity, Arc::clone(&ctx), api.clone(), display.clone(), settings());
        Self { controller, events, ctx, api, camera, display, server }
    }

    /// Wait until the client side has noticed the server hanging up.
    pub async fn wait_channel_closed(&self) {
        while self.ctx.channel().is_open() {
            tokio::task::yield_now().await;
        }
    }

    /// Another controller sharing this harness's context.
    pub fn sibling(&self, activity: Activity) -> (SessionController, mpsc::UnboundedReceiver<ControlEvent>) {
        SessionController::new(
            activity,
            Arc::clone(&self.ctx),
            self.api.clone(),
            self.display.clone(),
            settings(),
        )
    }
}
