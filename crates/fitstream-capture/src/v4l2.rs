//! V4L2 webcam capture through GStreamer.
//!
//! ```text
//! v4l2src device=/dev/videoN
//!        │
//!   videoconvert ! videoscale ! videorate
//!        │
//! video/x-raw,format=RGB,width=W,height=H,framerate=F/1
//!        │
//!     appsink (max-buffers=1 drop=true) ──► watch::Sender ──► Surface
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use fitstream_core::CaptureError;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::{CaptureConstraints, FrameSlot, RawFrame};

pub(crate) struct V4l2Capture {
    pipeline: gstreamer::Pipeline,
    stop_flag: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl V4l2Capture {
    pub(crate) fn open(
        device: &str,
        constraints: &CaptureConstraints,
        fps: u32,
        tx: watch::Sender<FrameSlot>,
    ) -> Result<Self, CaptureError> {
        gstreamer::init().map_err(|e| CaptureError::Backend(format!("GStreamer init: {e}")))?;

        let (w, h) = (constraints.width, constraints.height);
        let desc = format!(
            "v4l2src device={device} do-timestamp=true \
             ! videoconvert ! videoscale ! videorate \
             ! video/x-raw,format=RGB,width={w},height={h},framerate={fps}/1 \
             ! appsink name=sink max-buffers=1 drop=true sync=false emit-signals=false"
        );
        debug!("Camera pipeline: {}", desc);

        let pipeline = gstreamer::parse::launch(&desc)
            .map_err(|e| CaptureError::Backend(format!("Parsing camera pipeline: {e}")))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| CaptureError::Backend("Expected Pipeline element".to_owned()))?;

        let appsink: AppSink = pipeline
            .by_name("sink")
            .ok_or_else(|| CaptureError::Backend("Missing appsink 'sink'".to_owned()))?
            .downcast::<AppSink>()
            .map_err(|_| CaptureError::Backend("Expected AppSink".to_owned()))?;

        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
                    let pts_ms = buffer.pts().map(|t| t.mseconds()).unwrap_or(0);
                    let map = buffer.map_readable().map_err(|_| gstreamer::FlowError::Error)?;
                    let data = pack_rows(map.as_slice(), w, h).ok_or(gstreamer::FlowError::Error)?;

                    if tx.is_closed() {
                        return Err(gstreamer::FlowError::Flushing);
                    }
                    tx.send_replace(Some(Arc::new(RawFrame { data, width: w, height: h, pts_ms })));
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline.set_state(gstreamer::State::Playing).map_err(|e| {
            CaptureError::DeviceUnavailable { reason: format!("{device}: {e}") }
        })?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let last_error = Arc::new(Mutex::new(None));
        spawn_bus_watcher(&pipeline, Arc::clone(&stop_flag), Arc::clone(&last_error));

        info!("V4L2 capture started on {} ({}x{} @ {} fps)", device, w, h, fps);
        Ok(Self { pipeline, stop_flag, last_error })
    }

    /// Error reported on the bus since start, mapped to the capture taxonomy.
    pub(crate) fn take_error(&self) -> Option<CaptureError> {
        let msg = self
            .last_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()?;
        let lower = msg.to_ascii_lowercase();
        Some(if lower.contains("permission") || lower.contains("not authorized") {
            CaptureError::PermissionDenied { reason: msg }
        } else {
            CaptureError::DeviceUnavailable { reason: msg }
        })
    }

    pub(crate) fn stop(self) {
        self.stop_flag.store(true, Ordering::Release);
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

fn spawn_bus_watcher(
    pipeline: &gstreamer::Pipeline,
    stop_flag: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
) {
    let Some(bus) = pipeline.bus() else { return };
    // The bus pop is blocking; keep it off the async workers.
    tokio::task::spawn_blocking(move || {
        while !stop_flag.load(Ordering::Acquire) {
            let Some(msg) = bus.timed_pop(gstreamer::ClockTime::from_mseconds(200)) else {
                continue;
            };
            match msg.view() {
                gstreamer::MessageView::Eos(_) => {
                    info!("Camera pipeline EOS");
                    break;
                }
                gstreamer::MessageView::Error(e) => {
                    error!("Camera pipeline error: {}", e.error());
                    *last_error.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                        Some(e.error().to_string());
                    break;
                }
                _ => {}
            }
        }
    });
}

/// Strip per-row padding: GStreamer aligns RGB rows to 4 bytes.
fn pack_rows(src: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    let row = width as usize * 3;
    let rows = height as usize;
    if rows == 0 || src.len() < row * rows {
        return None;
    }
    let stride = src.len() / rows;
    if stride == row {
        return Some(src[..row * rows].to_vec());
    }
    let mut out = Vec::with_capacity(row * rows);
    for r in 0..rows {
        out.extend_from_slice(&src[r * stride..r * stride + row]);
    }
    Some(out)
}
