use thiserror::Error;

use crate::types::{Activity, SessionState};

/// Camera acquisition failures. Fatal to starting a session, never retried.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Camera unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    #[error("Camera produced no frames within {ms}ms")]
    NoFrames { ms: u64 },

    #[error("Capture backend not supported in this build: {backend}")]
    Unsupported { backend: String },

    #[error("Capture backend error: {0}")]
    Backend(String),
}

/// Channel and request/response failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Connect failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Receive failed: {reason}")]
    ReceiveFailed { reason: String },

    #[error("Message too large: {len} bytes (max {max})")]
    MessageTooLarge { len: usize, max: usize },

    #[error("Request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-management collaborator failures.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The collaborator answered `{status: "error"}`; the message is kept verbatim.
    #[error("{message}")]
    Rejected { message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Cannot {operation} while {from:?}")]
    InvalidTransition { from: SessionState, operation: &'static str },

    #[error("Camera and channel are held by the {holder} session")]
    DeviceBusy { holder: Activity },

    #[error("Stream channel to the analysis service is closed")]
    ChannelClosed,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration invalid: {reason}")]
    Invalid { reason: String },

    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
