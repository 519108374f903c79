//! fitstream-client — camera → analysis service streaming for timed
//! exercise sessions.
//!
//! # Architecture
//!
//! ```text
//!  CaptureSource ──► Surface ──► FrameSampler ──► BackpressureGate ──► StreamChannel ──► server
//!                                  (200 ms)        (≤ 1 outstanding)        │
//!                                                        ▲                  │
//!                                   inbound dispatcher ──┴── processed frame + stats / error
//!                                          │
//!                                          ▼
//!   SessionTimer (180 × 1 s) ──►     DisplaySink     ◄── StatsSync (pull every 500 ms)
//!          │ expiry
//!          ▼
//!   SessionController: Idle ──start──► Running ──stop/expiry──► Stopped
//! ```
//!
//! The camera and the channel are process-wide and live in a
//! [`StreamingContext`]; one controller at a time may claim them.

pub mod app;
pub mod context;
pub mod controller;
pub mod display;
pub mod encoder;
pub mod gate;
pub mod inbound;
pub mod liveness;
pub mod sampler;
pub mod stats_sync;
pub mod timer;

pub use context::{ContextClaim, StreamingContext};
pub use controller::{ControlEvent, ControllerSettings, SessionController};
pub use display::{ConsoleDisplay, DisplaySink, DisplayState, MemoryDisplay};
pub use encoder::{EncodeError, JpegEncoder};
pub use gate::{BackpressureGate, GateStats};
pub use liveness::{SessionLiveness, SessionToken};
pub use sampler::{FrameSampler, FrameSink, SamplerParams};
pub use stats_sync::StatsSync;
pub use timer::{format_remaining, SessionTimer};
