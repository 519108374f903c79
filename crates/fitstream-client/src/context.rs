//! Process-wide camera + channel, claimed by one activity at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fitstream_capture::{CaptureConstraints, CaptureSource, Surface};
use fitstream_core::{Activity, CaptureError, ControllerError};
use fitstream_transport_client::StreamChannel;
use tracing::{debug, info, warn};

pub struct StreamingContext {
    camera: tokio::sync::Mutex<Box<dyn CaptureSource>>,
    channel: Arc<StreamChannel>,
    holder: Mutex<Option<Activity>>,
}

impl StreamingContext {
    pub fn new(camera: Box<dyn CaptureSource>, channel: Arc<StreamChannel>) -> Arc<Self> {
        Arc::new(Self { camera: tokio::sync::Mutex::new(camera), channel, holder: Mutex::new(None) })
    }

    /// Exclusive use of camera and channel for `activity`. Fails without
    /// side effects while another activity holds them.
    pub fn claim(self: &Arc<Self>, activity: Activity) -> Result<ContextClaim, ControllerError> {
        let mut holder = self.holder();
        if let Some(current) = *holder {
            return Err(ControllerError::DeviceBusy { holder: current });
        }
        *holder = Some(activity);
        debug!("Context claimed by {}", activity);
        Ok(ContextClaim { ctx: Arc::clone(self), activity })
    }

    pub fn holder_activity(&self) -> Option<Activity> {
        *self.holder()
    }

    pub async fn camera_acquired(&self) -> bool {
        self.camera.lock().await.is_acquired()
    }

    pub fn channel(&self) -> &Arc<StreamChannel> {
        &self.channel
    }

    fn holder(&self) -> MutexGuard<'_, Option<Activity>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by a controller between claim and teardown; dropping it releases
/// the camera and frees the context.
pub struct ContextClaim {
    ctx: Arc<StreamingContext>,
    activity: Activity,
}

impl ContextClaim {
    pub async fn acquire_camera(&self, constraints: &CaptureConstraints) -> Result<Surface, CaptureError> {
        self.ctx.camera.lock().await.acquire(constraints).await
    }

    pub async fn release_camera(&self) {
        self.ctx.camera.lock().await.release();
    }

    pub fn channel(&self) -> &Arc<StreamChannel> {
        &self.ctx.channel
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }
}

impl Drop for ContextClaim {
    fn drop(&mut self) {
        match self.ctx.camera.try_lock() {
            Ok(mut camera) => {
                if camera.is_acquired() {
                    camera.release();
                    info!("Camera released on claim drop ({})", self.activity);
                }
            }
            Err(_) => warn!("Camera busy while dropping claim for {}", self.activity),
        }
        *self.ctx.holder() = None;
        debug!("Context released by {}", self.activity);
    }
}
