use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;
use crate::types::Resolution;

/// Client configuration. Layered: defaults → JSON file → `FITSTREAM_*`
/// environment → command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the session-management service.
    #[serde(alias = "serverUrl")]
    pub server_url: String,
    /// `host:port` of the frame stream channel.
    #[serde(alias = "channelAddr")]
    pub channel_addr: String,
    pub tls: bool,
    pub capture: CaptureConfig,
    pub streaming: StreamingConfig,
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_owned(),
            channel_addr: "127.0.0.1:5001".to_owned(),
            tls: false,
            capture: CaptureConfig::default(),
            streaming: StreamingConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// `test` for the synthetic pattern, otherwise a V4L2 device path.
    pub camera: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    #[serde(alias = "maxFps")]
    pub max_fps: u32,
    #[serde(alias = "facingMode")]
    pub facing_mode: String,
    #[serde(alias = "firstFrameTimeoutMs")]
    pub first_frame_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera: "test".to_owned(),
            width: Resolution::CAPTURE_TARGET.width,
            height: Resolution::CAPTURE_TARGET.height,
            fps: 15,
            max_fps: 20,
            facing_mode: "user".to_owned(),
            first_frame_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    #[serde(alias = "sampleIntervalMs")]
    pub sample_interval_ms: u64,
    /// JPEG quality, 1–100 (60 ≙ 0.6).
    #[serde(alias = "jpegQuality")]
    pub jpeg_quality: u8,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { sample_interval_ms: 200, jpeg_quality: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Countdown bound in ticks.
    #[serde(alias = "durationTicks")]
    pub duration_ticks: u32,
    #[serde(alias = "tickMs")]
    pub tick_ms: u64,
    #[serde(alias = "statsPollMs")]
    pub stats_poll_ms: u64,
    #[serde(alias = "requestTimeoutMs")]
    pub request_timeout_ms: u64,
    /// Upper bound on the best-effort cleanup call during shutdown.
    #[serde(alias = "cleanupTimeoutMs")]
    pub cleanup_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_ticks: 180,
            tick_ms: 1_000,
            stats_poll_ms: 500,
            request_timeout_ms: 5_000,
            cleanup_timeout_ms: 1_000,
        }
    }
}

impl StreamingConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl SessionConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn stats_poll(&self) -> Duration {
        Duration::from_millis(self.stats_poll_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }
}

impl ClientConfig {
    /// Load from an optional JSON file; a missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                debug!("Loaded config from {}", p.display());
                Ok(serde_json::from_str(&text)?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `FITSTREAM_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("FITSTREAM_SERVER_URL") {
            self.server_url = url;
        }
        if let Some(addr) = lookup("FITSTREAM_CHANNEL_ADDR") {
            self.channel_addr = addr;
        }
        if let Some(tls) = lookup("FITSTREAM_TLS") {
            self.tls = matches!(tls.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(camera) = lookup("FITSTREAM_CAMERA") {
            self.capture.camera = camera;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::Invalid { reason: reason.to_owned() });

        if self.server_url.trim().is_empty() {
            return invalid("server_url is empty");
        }
        if self.channel_addr.trim().is_empty() {
            return invalid("channel_addr is empty");
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return invalid("capture resolution must be non-zero");
        }
        if self.capture.fps == 0 || self.capture.max_fps < self.capture.fps {
            return invalid("capture fps must be non-zero and not exceed max_fps");
        }
        if !(1..=100).contains(&self.streaming.jpeg_quality) {
            return invalid("jpeg_quality must be within 1..=100");
        }
        if self.streaming.sample_interval_ms == 0
            || self.session.tick_ms == 0
            || self.session.stats_poll_ms == 0
        {
            return invalid("intervals must be non-zero");
        }
        if self.session.duration_ticks == 0 {
            return invalid("duration_ticks must be non-zero");
        }
        Ok(())
    }
}
