//! fitstream-core — shared types for the FitStream camera client.
//!
//! Holds everything the capture, transport, and client crates agree on:
//! the fixed [`Activity`] table (wire tags, HTTP routes, stats delivery
//! mode), frame types, the defaulting [`StatsSnapshot`], error enums, and
//! [`ClientConfig`].

pub mod config;
pub mod errors;
pub mod stats;
pub mod types;

pub use config::{CaptureConfig, ClientConfig, SessionConfig, StreamingConfig};
pub use errors::{CaptureError, ConfigError, ControllerError, SessionError, TransportError};
pub use stats::{StatValue, StatsSnapshot};
pub use types::*;
