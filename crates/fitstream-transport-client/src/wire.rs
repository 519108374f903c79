//! Stream channel wire format.
//!
//! Every message is a 4-byte big-endian length followed by a JSON object.
//!
//! ```text
//! client → server   {"tag": "dumbbell_frame", "image": "data:image/jpeg;base64,..."}
//! server → client   {"tag": "processed_dumbbell_frame", "image": "...", "stats": {...}}
//!                   {"tag": "processed_height_weight_frame", "image": "...", "measurement": {...}}
//!                   {"tag": "error", "message": "..."}
//! ```

use fitstream_core::TransportError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

/// Upper bound on a single framed message (one JPEG data URL plus stats).
pub const MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

/// Inbound tag of channel-level error events.
pub const ERROR_EVENT: &str = "error";

/// Outbound frame message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub tag: String,
    pub image: String,
}

/// Any message sent by the analysis service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InboundMessage {
    pub fn processed(event: &str, image: impl Into<String>, stats: Value) -> Self {
        Self {
            tag: event.to_owned(),
            image: Some(image.into()),
            stats: Some(stats),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            tag: ERROR_EVENT.to_owned(),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Stats object of a processed event, whichever key carried it.
    pub fn take_stats(&mut self) -> Value {
        self.stats.take().or_else(|| self.measurement.take()).unwrap_or(Value::Null)
    }
}

// ── Length-prefixed framing ───────────────────────────────────────────────────

/// Write one framed message; returns the body size.
pub async fn write_msg<T: Serialize>(
    stream: &mut (impl AsyncWriteExt + Unpin),
    msg: &T,
) -> Result<usize, TransportError> {
    let json = serde_json::to_vec(msg).map_err(|e| TransportError::SendFailed { reason: e.to_string() })?;
    if json.len() > MAX_MESSAGE_BYTES {
        return Err(TransportError::MessageTooLarge { len: json.len(), max: MAX_MESSAGE_BYTES });
    }
    let len = json.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&json).await?;
    stream.flush().await?;
    trace!("Wrote message ({} bytes)", json.len());
    Ok(json.len())
}

/// Read one framed message.
///
/// A clean EOF before the length prefix maps to `ConnectionClosed`. A body
/// that is not valid JSON for `T` maps to `ReceiveFailed`; the stream stays
/// aligned on the next frame in that case.
pub async fn read_msg<T: DeserializeOwned>(
    stream: &mut (impl AsyncReadExt + Unpin),
) -> Result<T, TransportError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_BYTES {
        return Err(TransportError::MessageTooLarge { len, max: MAX_MESSAGE_BYTES });
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => TransportError::ConnectionClosed,
        _ => e.into(),
    })?;
    trace!("Read message ({} bytes)", len);
    serde_json::from_slice(&body).map_err(|e| TransportError::ReceiveFailed {
        reason: format!("malformed message: {e}"),
    })
}
