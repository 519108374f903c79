//! fitstream-capture — camera capture for the FitStream client.
//!
//! # Capture backends
//!
//! | Backend | Source | Availability |
//! |---------|--------|--------------|
//! | Test pattern | synthetic moving gradient | always |
//! | V4L2 | `v4l2src` through GStreamer | Linux + `gstreamer` feature |
//!
//! # Usage
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), fitstream_core::CaptureError> {
//! use fitstream_capture::{CameraBackend, CameraCapturer, CaptureConstraints, CaptureSource};
//! let mut camera = CameraCapturer::new(CameraBackend::TestPattern);
//! let surface = camera.acquire(&CaptureConstraints::default()).await?;
//! if let Some(frame) = surface.current() {
//!     // frame.data: RGB8 pixels, frame.width × frame.height
//! }
//! camera.release();
//! # Ok(())
//! # }
//! ```
//!
//! # Surface model
//!
//! ```text
//! device / generator ──► watch::Sender<Option<Arc<RawFrame>>>
//!                                 │  (latest frame only, older ones overwritten)
//!                                 ▼
//!                      Surface::current()  ◄── FrameSampler tick
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fitstream_core::{CaptureConfig, CaptureError, Resolution};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

mod test_pattern;
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
mod v4l2;

// ── Public types ──────────────────────────────────────────────────────────────

/// Camera request hints. The device may negotiate something close to these.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    /// Ideal frame rate.
    pub fps: u32,
    /// Hard frame-rate cap.
    pub max_fps: u32,
    pub facing_mode: String,
    /// How long `acquire` waits for the first frame.
    pub first_frame_timeout: Duration,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for CaptureConstraints {
    fn from(cfg: &CaptureConfig) -> Self {
        Self {
            width: cfg.width,
            height: cfg.height,
            fps: cfg.fps,
            max_fps: cfg.max_fps,
            facing_mode: cfg.facing_mode.clone(),
            first_frame_timeout: Duration::from_millis(cfg.first_frame_timeout_ms),
        }
    }
}

impl CaptureConstraints {
    /// Ideal rate clamped to the cap (never zero).
    pub fn negotiated_fps(&self) -> u32 {
        self.fps.min(self.max_fps).max(1)
    }
}

/// A decoded camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// RGB8, tightly packed (3 bytes per pixel).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp in milliseconds since the device started.
    pub pts_ms: u64,
}

impl RawFrame {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// The single frame slot shared between a producer and its surfaces.
pub type FrameSlot = Option<Arc<RawFrame>>;

/// Read side of an acquired camera: always the most recent frame.
#[derive(Debug, Clone)]
pub struct Surface {
    rx: watch::Receiver<FrameSlot>,
    resolution: Resolution,
    fps: u32,
}

impl Surface {
    /// Surface over an externally driven frame slot.
    pub fn from_watch(rx: watch::Receiver<FrameSlot>, resolution: Resolution, fps: u32) -> Self {
        Self { rx, resolution, fps }
    }

    /// The frame currently on the surface, if any.
    pub fn current(&self) -> Option<Arc<RawFrame>> {
        self.rx.borrow().clone()
    }

    /// Native dimensions reported by the first frame.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// False once the producing device has been released.
    pub fn is_live(&self) -> bool {
        self.rx.has_changed().is_ok()
    }
}

/// A camera that can be acquired and released.
///
/// `release` must be idempotent and safe to call without a prior acquire.
#[async_trait]
pub trait CaptureSource: Send {
    /// Acquire the device and resolve once it has produced a usable frame.
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<Surface, CaptureError>;

    /// Stop all device tracks.
    fn release(&mut self);

    fn is_acquired(&self) -> bool;
}

// ── Backend selection ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraBackend {
    TestPattern,
    V4l2 { device: String },
}

impl FromStr for CameraBackend {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "" | "test" | "test-pattern" | "testpattern" => Self::TestPattern,
            device => Self::V4l2 { device: device.to_owned() },
        })
    }
}

// ── CameraCapturer ────────────────────────────────────────────────────────────

enum ActiveCapture {
    TestPattern(JoinHandle<()>),
    #[cfg(all(feature = "gstreamer", target_os = "linux"))]
    V4l2(v4l2::V4l2Capture),
}

/// The process camera. Open with [`CameraCapturer::new`], then
/// [`CaptureSource::acquire`].
pub struct CameraCapturer {
    backend: CameraBackend,
    active: Option<ActiveCapture>,
}

impl CameraCapturer {
    pub fn new(backend: CameraBackend) -> Self {
        Self { backend, active: None }
    }

    pub fn backend(&self) -> &CameraBackend {
        &self.backend
    }
}

#[async_trait]
impl CaptureSource for CameraCapturer {
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<Surface, CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::DeviceUnavailable {
                reason: "camera already acquired".to_owned(),
            });
        }

        let fps = constraints.negotiated_fps();
        let (tx, rx) = watch::channel::<FrameSlot>(None);

        let active = match &self.backend {
            CameraBackend::TestPattern => {
                ActiveCapture::TestPattern(test_pattern::spawn(constraints.width, constraints.height, fps, tx))
            }
            #[cfg(all(feature = "gstreamer", target_os = "linux"))]
            CameraBackend::V4l2 { device } => {
                ActiveCapture::V4l2(v4l2::V4l2Capture::open(device, constraints, fps, tx)?)
            }
            #[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
            CameraBackend::V4l2 { device } => {
                drop(tx);
                return Err(CaptureError::Unsupported {
                    backend: format!("v4l2 ({device})"),
                });
            }
        };
        self.active = Some(active);

        match wait_first_frame(rx, constraints.first_frame_timeout).await {
            Ok(surface) => {
                let surface = Surface { fps, ..surface };
                info!(
                    "Camera acquired: {} @ {} fps ({:?})",
                    surface.resolution, fps, self.backend
                );
                Ok(surface)
            }
            Err(e) => {
                let e = self.classify_failure(e);
                self.release();
                Err(e)
            }
        }
    }

    fn release(&mut self) {
        match self.active.take() {
            Some(ActiveCapture::TestPattern(handle)) => {
                handle.abort();
                info!("Camera released (test pattern)");
            }
            #[cfg(all(feature = "gstreamer", target_os = "linux"))]
            Some(ActiveCapture::V4l2(capture)) => {
                capture.stop();
                info!("Camera released ({:?})", self.backend);
            }
            None => debug!("Camera release: nothing acquired"),
        }
    }

    fn is_acquired(&self) -> bool {
        self.active.is_some()
    }
}

impl CameraCapturer {
    /// Prefer the backend's own error report over a bare timeout.
    fn classify_failure(&self, err: CaptureError) -> CaptureError {
        match (&self.active, err) {
            #[cfg(all(feature = "gstreamer", target_os = "linux"))]
            (Some(ActiveCapture::V4l2(capture)), CaptureError::NoFrames { ms }) => {
                capture.take_error().unwrap_or(CaptureError::NoFrames { ms })
            }
            (_, err) => err,
        }
    }
}

impl Drop for CameraCapturer {
    fn drop(&mut self) {
        self.release();
    }
}

async fn wait_first_frame(
    mut rx: watch::Receiver<FrameSlot>,
    timeout: Duration,
) -> Result<Surface, CaptureError> {
    let ms = timeout.as_millis() as u64;
    let resolution = {
        let waited = tokio::time::timeout(timeout, rx.wait_for(|slot| slot.is_some())).await;
        match waited {
            Ok(Ok(slot)) => slot.as_ref().map(|f| f.resolution()),
            Ok(Err(_)) => {
                return Err(CaptureError::DeviceUnavailable {
                    reason: "camera stopped before the first frame".to_owned(),
                })
            }
            Err(_) => return Err(CaptureError::NoFrames { ms }),
        }
    };
    match resolution {
        Some(resolution) if !resolution.is_empty() => Ok(Surface { rx, resolution, fps: 0 }),
        _ => Err(CaptureError::DeviceUnavailable {
            reason: "first frame has no usable dimensions".to_owned(),
        }),
    }
}
