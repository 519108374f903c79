use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// MARK: - Resolution

/// Frame resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Capture target used by every activity (≈480×360).
    pub const CAPTURE_TARGET: Self = Self { width: 480, height: 360 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - Activity

/// How an activity's statistics reach the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsMode {
    /// Poll the stats endpoint on a fixed period while running.
    Pull,
    /// Stats arrive only alongside processed frames.
    Push,
}

/// Fixed wire and HTTP names for one activity.
#[derive(Debug)]
pub struct ActivityProfile {
    pub channel_id: &'static str,
    /// Tag on outbound frame messages.
    pub frame_tag: &'static str,
    /// Inbound event name carrying processed frames.
    pub processed_event: &'static str,
    pub route_prefix: &'static str,
    pub begin_endpoint: &'static str,
    pub end_endpoint: &'static str,
    pub reset_endpoint: &'static str,
    pub stats_mode: StatsMode,
}

static PROFILES: [ActivityProfile; 4] = [
    ActivityProfile {
        channel_id: "dumbbell",
        frame_tag: "dumbbell_frame",
        processed_event: "processed_dumbbell_frame",
        route_prefix: "dumbbell",
        begin_endpoint: "start_camera",
        end_endpoint: "stop_camera",
        reset_endpoint: "reset_counter",
        stats_mode: StatsMode::Pull,
    },
    ActivityProfile {
        channel_id: "jump",
        frame_tag: "jump_frame",
        processed_event: "processed_jump_frame",
        route_prefix: "vertical_jump",
        begin_endpoint: "start_camera",
        end_endpoint: "stop_camera",
        reset_endpoint: "reset_counter",
        stats_mode: StatsMode::Pull,
    },
    ActivityProfile {
        channel_id: "height_weight",
        frame_tag: "height_weight_frame",
        processed_event: "processed_height_weight_frame",
        route_prefix: "height_weight",
        begin_endpoint: "start_measurement",
        end_endpoint: "stop_measurement",
        reset_endpoint: "reset_measurement",
        stats_mode: StatsMode::Push,
    },
    ActivityProfile {
        channel_id: "situp",
        frame_tag: "video_frame",
        processed_event: "processed_frame",
        route_prefix: "situp",
        begin_endpoint: "start_camera",
        end_endpoint: "stop_camera",
        reset_endpoint: "reset_counter",
        stats_mode: StatsMode::Pull,
    },
];

/// One supported tracking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Dumbbell,
    VerticalJump,
    HeightWeight,
    Situp,
}

impl Activity {
    pub const ALL: [Activity; 4] = [
        Activity::Dumbbell,
        Activity::VerticalJump,
        Activity::HeightWeight,
        Activity::Situp,
    ];

    pub fn profile(self) -> &'static ActivityProfile {
        &PROFILES[self as usize]
    }

    pub fn channel_id(self) -> &'static str {
        self.profile().channel_id
    }

    pub fn frame_tag(self) -> &'static str {
        self.profile().frame_tag
    }

    pub fn processed_event(self) -> &'static str {
        self.profile().processed_event
    }

    pub fn stats_mode(self) -> StatsMode {
        self.profile().stats_mode
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel_id())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown activity '{0}' (expected dumbbell, jump, height_weight or situp)")]
pub struct ParseActivityError(pub String);

impl FromStr for Activity {
    type Err = ParseActivityError;

    /// Accepts the channel id, the HTTP route prefix, or the frame tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        Activity::ALL
            .into_iter()
            .find(|a| {
                let p = a.profile();
                needle == p.channel_id || needle == p.route_prefix || needle == p.frame_tag
            })
            .ok_or_else(|| ParseActivityError(s.to_owned()))
    }
}

// MARK: - SessionState

/// Per-activity session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Ready to start"),
            Self::Running => write!(f, "Session in progress"),
            Self::Stopped => write!(f, "Session paused"),
        }
    }
}

// MARK: - Frames

const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// A JPEG-encoded camera frame, produced and consumed within one round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub data: Bytes,
    pub resolution: Resolution,
    /// Capture timestamp relative to device start.
    pub pts_ms: u64,
}

impl EncodedFrame {
    /// Wire payload: `data:image/jpeg;base64,...`.
    pub fn to_data_url(&self) -> String {
        let mut url = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + self.data.len() * 4 / 3 + 4);
        url.push_str(JPEG_DATA_URL_PREFIX);
        BASE64.encode_string(&self.data, &mut url);
        url
    }
}

/// Image payload returned by the analysis service, kept in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFrame {
    pub data_url: String,
}

impl ProcessedFrame {
    pub fn new(data_url: impl Into<String>) -> Self {
        Self { data_url: data_url.into() }
    }

    /// Decoded image bytes. Accepts both data URLs and bare base64.
    pub fn decode(&self) -> Option<Bytes> {
        let b64 = match self.data_url.split_once(',') {
            Some((header, body)) if header.starts_with("data:") => body,
            _ => self.data_url.as_str(),
        };
        BASE64.decode(b64.trim()).ok().map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_table_is_consistent() {
        for a in Activity::ALL {
            assert_eq!(a.profile().channel_id, a.channel_id());
            assert!(a.processed_event().starts_with("processed_"));
        }
        assert_eq!(Activity::Dumbbell.frame_tag(), "dumbbell_frame");
        assert_eq!(Activity::VerticalJump.processed_event(), "processed_jump_frame");
        assert_eq!(Activity::HeightWeight.stats_mode(), StatsMode::Push);
        assert_eq!(Activity::HeightWeight.profile().begin_endpoint, "start_measurement");
    }

    #[test]
    fn parses_channel_ids_and_route_prefixes() {
        assert_eq!("jump".parse::<Activity>().unwrap(), Activity::VerticalJump);
        assert_eq!("vertical_jump".parse::<Activity>().unwrap(), Activity::VerticalJump);
        assert_eq!("Height-Weight".parse::<Activity>().unwrap(), Activity::HeightWeight);
        assert_eq!("video_frame".parse::<Activity>().unwrap(), Activity::Situp);
        assert!("yoga".parse::<Activity>().is_err());
    }

    #[test]
    fn processed_frame_decodes_data_url() {
        let frame = EncodedFrame {
            data: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
            resolution: Resolution::new(2, 2),
            pts_ms: 0,
        };
        let url = frame.to_data_url();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let back = ProcessedFrame::new(url).decode().expect("valid base64");
        assert_eq!(&back[..], &[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(ProcessedFrame::new("data:image/jpeg;base64,@@@").decode().is_none());
    }
}
