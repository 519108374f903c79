//! `SessionController` — Idle / Running / Stopped lifecycle of one activity.
//!
//! ```text
//!            start() ok             stop() / timer expiry / channel closed
//!   Idle ───────────────► Running ───────────────────────────► Stopped
//!    ▲  ◄─ start() fails ─┘  │                                    │
//!    │      (state kept)     │ reset() = stop() + counter reset   │
//!    └───────────────────────┴──────────────── reset() ───────────┘
//! ```
//!
//! Everything a running session owns (sampler, timer, stats poll, inbound
//! dispatcher, camera, context claim) is torn down by one routine,
//! `teardown`, and nowhere else.

use std::sync::Arc;
use std::time::Duration;

use fitstream_capture::CaptureConstraints;
use fitstream_core::{
    Activity, ClientConfig, ControllerError, SessionError, SessionState, StatsSnapshot,
};
use fitstream_transport_client::{SessionApi, SessionReply};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::{ContextClaim, StreamingContext};
use crate::display::DisplaySink;
use crate::encoder::JpegEncoder;
use crate::gate::{BackpressureGate, GateStats};
use crate::inbound;
use crate::liveness::{SessionLiveness, SessionToken};
use crate::sampler::{FrameSampler, FrameSink, SamplerParams};
use crate::stats_sync::StatsSync;
use crate::timer::SessionTimer;

/// Asynchronous inputs to the controller's control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    TimerExpired { session: u64 },
    /// The stream channel ended while `session` was running.
    ChannelClosed { session: u64 },
}

/// Timing and capture parameters of a controller.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub constraints: CaptureConstraints,
    pub sample_interval: Duration,
    pub jpeg_quality: u8,
    pub duration_ticks: u32,
    pub tick: Duration,
    pub stats_poll: Duration,
    pub cleanup_timeout: Duration,
}

impl From<&ClientConfig> for ControllerSettings {
    fn from(cfg: &ClientConfig) -> Self {
        Self {
            constraints: CaptureConstraints::from(&cfg.capture),
            sample_interval: cfg.streaming.sample_interval(),
            jpeg_quality: cfg.streaming.jpeg_quality,
            duration_ticks: cfg.session.duration_ticks,
            tick: cfg.session.tick(),
            stats_poll: cfg.session.stats_poll(),
            cleanup_timeout: cfg.session.cleanup_timeout(),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

struct RunningSession {
    claim: ContextClaim,
    token: SessionToken,
    gate: Arc<BackpressureGate>,
    sampler: FrameSampler,
    stats: StatsSync,
    inbound: JoinHandle<()>,
}

impl Drop for RunningSession {
    fn drop(&mut self) {
        self.inbound.abort();
    }
}

pub struct SessionController {
    activity: Activity,
    ctx: Arc<StreamingContext>,
    api: Arc<dyn SessionApi>,
    display: Arc<dyn DisplaySink>,
    settings: ControllerSettings,
    state: SessionState,
    liveness: SessionLiveness,
    timer: SessionTimer,
    running: Option<RunningSession>,
    last_gate: GateStats,
    events_tx: mpsc::UnboundedSender<ControlEvent>,
}

impl SessionController {
    /// Build an Idle controller. Timer expiries and channel closes arrive on
    /// the returned receiver and must be fed back through [`handle_event`](Self::handle_event).
    pub fn new(
        activity: Activity,
        ctx: Arc<StreamingContext>,
        api: Arc<dyn SessionApi>,
        display: Arc<dyn DisplaySink>,
        settings: ControllerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ControlEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let timer = SessionTimer::new(settings.duration_ticks, settings.tick);
        let controller = Self {
            activity,
            ctx,
            api,
            display,
            settings,
            state: SessionState::Idle,
            liveness: SessionLiveness::new(),
            timer,
            running: None,
            last_gate: GateStats::default(),
            events_tx,
        };
        (controller, events_rx)
    }

    // ── Operations ───────────────────────────────────────────────────────────

    /// Idle/Stopped → Running. Refused while the stream channel is closed.
    /// On any failure the state is unchanged and nothing stays acquired.
    pub async fn start(&mut self) -> Result<(), ControllerError> {
        if self.state == SessionState::Running {
            return Err(ControllerError::InvalidTransition { from: self.state, operation: "start" });
        }
        let activity = self.activity;

        let claim = match self.ctx.claim(activity) {
            Ok(claim) => claim,
            Err(e) => {
                warn!("Activity[{}]: {}", activity, e);
                self.display.notify_user(&e.to_string());
                return Err(e);
            }
        };

        if !claim.channel().is_open() {
            let e = ControllerError::ChannelClosed;
            warn!("Activity[{}]: {}", activity, e);
            self.display.notify_user(&format!("Failed to start: {e}"));
            return Err(e);
        }

        let surface = match claim.acquire_camera(&self.settings.constraints).await {
            Ok(surface) => surface,
            Err(e) => {
                warn!("Activity[{}]: camera acquisition failed: {}", activity, e);
                self.display.notify_user(&format!("Failed to access camera: {e}"));
                return Err(e.into());
            }
        };

        let begun = self
            .api
            .begin(activity)
            .await
            .map_err(SessionError::from)
            .and_then(SessionReply::accepted);
        if let Err(e) = begun {
            warn!("Activity[{}]: begin rejected: {}", activity, e);
            claim.release_camera().await;
            self.display.notify_user(&format!("Failed to start: {e}"));
            return Err(e.into());
        }

        let token = self.liveness.begin();
        let gate = Arc::new(BackpressureGate::new());
        let route = claim.channel().route(activity.processed_event());
        let inbound = inbound::spawn(
            activity,
            route,
            Arc::clone(&gate),
            Arc::clone(&self.display),
            self.events_tx.clone(),
            token.clone(),
        );
        let sink: Arc<dyn FrameSink> = claim.channel().clone();
        let sampler = FrameSampler::start(SamplerParams {
            tag: activity.frame_tag(),
            interval: self.settings.sample_interval,
            gate: Arc::clone(&gate),
            surface,
            encoder: JpegEncoder::new(self.settings.jpeg_quality),
            sink,
            token: token.clone(),
        });
        self.timer.start(token.clone(), self.events_tx.clone(), Arc::clone(&self.display));
        let stats = StatsSync::start(
            activity,
            Arc::clone(&self.api),
            self.settings.stats_poll,
            token.clone(),
            Arc::clone(&self.display),
        );

        info!("Activity[{}]: session {} running", activity, token.id());
        self.running = Some(RunningSession { claim, token, gate, sampler, stats, inbound });
        self.set_state(SessionState::Running);
        Ok(())
    }

    /// Running → Stopped. The end call is best-effort; local teardown always
    /// happens. From any other state this only runs the teardown.
    pub async fn stop(&mut self) {
        if self.state != SessionState::Running {
            debug!("Activity[{}]: stop while {:?}, cleanup only", self.activity, self.state);
            self.teardown().await;
            return;
        }

        match self.api.end(self.activity).await {
            Ok(reply) => {
                if let Err(e) = reply.accepted() {
                    warn!("Activity[{}]: end rejected: {}", self.activity, e);
                }
            }
            Err(e) => warn!("Activity[{}]: end failed: {}", self.activity, e),
        }

        self.teardown().await;
        self.set_state(SessionState::Stopped);
        info!("Activity[{}]: session stopped", self.activity);
    }

    /// Stop if running, then reset the server-side counters. On success the
    /// display shows the default snapshot, the full timer, and Idle.
    pub async fn reset(&mut self) -> Result<(), ControllerError> {
        if self.state == SessionState::Running {
            self.stop().await;
        }

        let reset = self
            .api
            .reset_counters(self.activity)
            .await
            .map_err(SessionError::from)
            .and_then(SessionReply::accepted);
        if let Err(e) = reset {
            warn!("Activity[{}]: reset failed: {}", self.activity, e);
            return Err(e.into());
        }

        self.timer.reset();
        self.display.show_stats(&StatsSnapshot::defaults(self.activity));
        self.display.show_timer(&self.timer.formatted());
        self.set_state(SessionState::Idle);
        info!("Activity[{}]: counters reset", self.activity);
        Ok(())
    }

    /// Process teardown: bounded best-effort cleanup notice, then local
    /// teardown regardless of its outcome.
    pub async fn shutdown(&mut self) {
        let timeout = self.settings.cleanup_timeout;
        match tokio::time::timeout(timeout, self.api.cleanup(self.activity)).await {
            Ok(Ok(())) => debug!("Activity[{}]: cleanup sent", self.activity),
            Ok(Err(e)) => warn!("Activity[{}]: cleanup failed: {}", self.activity, e),
            Err(_) => warn!("Activity[{}]: cleanup timed out after {:?}", self.activity, timeout),
        }

        let was_running = self.state == SessionState::Running;
        self.teardown().await;
        if was_running {
            self.set_state(SessionState::Stopped);
        }
        info!("Activity[{}]: shut down", self.activity);
    }

    /// Apply a control event. Returns `true` if it stopped the session.
    pub async fn handle_event(&mut self, event: ControlEvent) -> bool {
        let (session, reason) = match event {
            ControlEvent::TimerExpired { session } => (session, "session time is up"),
            ControlEvent::ChannelClosed { session } => (session, "stream channel closed"),
        };
        let current = self.running.as_ref().map(|r| r.token.id());
        if self.state != SessionState::Running || current != Some(session) {
            debug!("Activity[{}]: stale event for session {} ({})", self.activity, session, reason);
            return false;
        }
        info!("Activity[{}]: {}, stopping", self.activity, reason);
        self.stop().await;
        true
    }

    // ── Teardown ─────────────────────────────────────────────────────────────

    /// Cancel every periodic task, then release the camera and the claim.
    async fn teardown(&mut self) {
        self.liveness.end();
        self.timer.stop();

        let Some(mut run) = self.running.take() else {
            return;
        };
        run.sampler.stop();
        run.stats.stop();
        run.inbound.abort();
        run.claim.channel().unroute(self.activity.processed_event());
        run.gate.clear();
        self.last_gate = run.gate.stats();

        run.claim.release_camera().await;
        debug!("Activity[{}]: session {} torn down ({:?})", self.activity, run.token.id(), self.last_gate);
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Gate counters of the running session, or of the last one.
    pub fn gate_stats(&self) -> GateStats {
        self.running.as_ref().map_or(self.last_gate, |r| r.gate.stats())
    }

    pub fn is_sampling(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.sampler.is_running())
    }

    pub fn is_polling_stats(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.stats.is_polling())
    }

    pub fn timer(&self) -> &SessionTimer {
        &self.timer
    }

    pub fn control_sender(&self) -> mpsc::UnboundedSender<ControlEvent> {
        self.events_tx.clone()
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.display.show_state(state);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.liveness.end();
    }
}
