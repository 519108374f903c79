//! fitstream-transport-client — client side of the analysis service.
//!
//! # Architecture
//!
//! ```text
//! FitStream client                           Analysis service
//! ────────────────────────────────           ──────────────────────────
//! StreamChannel ── TCP/TLS, framed JSON ──►  frame processing
//!               ◄── processed frames, stats, errors
//! HttpSessionApi ── HTTP GET/POST ────────►  per-activity session routes
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fitstream_core::Activity;
//! use fitstream_transport_client::{HttpSessionApi, SessionApi, StreamChannel};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let api = HttpSessionApi::new("http://127.0.0.1:5000", std::time::Duration::from_secs(5))?;
//! api.begin(Activity::Dumbbell).await?.accepted()?;
//!
//! let channel = StreamChannel::connect("127.0.0.1:5001", false).await?;
//! let mut processed = channel.route(Activity::Dumbbell.processed_event());
//! // … channel.send_frame(Activity::Dumbbell.frame_tag(), &frame).await?
//! # let _ = processed.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod session_api;
mod tls;
pub mod wire;

pub use channel::{ChannelEvent, StreamChannel, ROUTE_CAPACITY};
pub use session_api::{HttpSessionApi, ReplyStatus, SessionApi, SessionReply};
pub use wire::{InboundMessage, OutboundFrame, MAX_MESSAGE_BYTES};
