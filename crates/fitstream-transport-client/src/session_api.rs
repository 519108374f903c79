//! Session-management collaborator: begin / end / reset / stats per activity.
//!
//! ```text
//! GET  {base}/{prefix}/start_camera     → {"status": "success", "message": "Started"}
//! GET  {base}/{prefix}/stop_camera      → {"status": "success" | "error", "message": ...}
//! GET  {base}/{prefix}/reset_counter    → {"status": ..., "message": ...}
//! GET  {base}/{prefix}/get_stats        → { activity-specific stats object }
//! POST {base}/{prefix}/cleanup          → anything 2xx
//! ```
//!
//! Height/weight uses `start_measurement` / `stop_measurement` /
//! `reset_measurement` instead; see [`fitstream_core::ActivityProfile`].

use std::time::Duration;

use async_trait::async_trait;
use fitstream_core::{Activity, SessionError, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// `{status, message}` reply of the begin/end/reset calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub message: String,
}

impl SessionReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self { status: ReplyStatus::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: ReplyStatus::Error, message: message.into() }
    }

    /// `Ok(message)` on success, otherwise the message as a rejection.
    pub fn accepted(self) -> Result<String, SessionError> {
        match self.status {
            ReplyStatus::Success => Ok(self.message),
            ReplyStatus::Error => Err(SessionError::Rejected { message: self.message }),
        }
    }
}

#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn begin(&self, activity: Activity) -> Result<SessionReply, TransportError>;

    async fn end(&self, activity: Activity) -> Result<SessionReply, TransportError>;

    async fn reset_counters(&self, activity: Activity) -> Result<SessionReply, TransportError>;

    /// Raw stats object; defaulting happens on the caller's side.
    async fn get_stats(&self, activity: Activity) -> Result<Value, TransportError>;

    /// Best-effort notice that the client is going away.
    async fn cleanup(&self, activity: Activity) -> Result<(), TransportError>;
}

// ── HTTP implementation ───────────────────────────────────────────────────────

pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSessionApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::RequestFailed { reason: format!("building HTTP client: {e}") })?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned(), timeout })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, activity: Activity, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, activity.profile().route_prefix, endpoint)
    }

    fn map_err(&self, url: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout { ms: self.timeout.as_millis() as u64 }
        } else {
            TransportError::RequestFailed { reason: format!("{url}: {e}") }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, TransportError> {
        debug!("GET {}", url);
        let resp = self.client.get(&url).send().await.map_err(|e| self.map_err(&url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::RequestFailed { reason: format!("{url}: HTTP {status}") });
        }
        resp.json::<T>().await.map_err(|e| TransportError::RequestFailed {
            reason: format!("{url}: undecodable body: {e}"),
        })
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn begin(&self, activity: Activity) -> Result<SessionReply, TransportError> {
        self.get_json(self.url(activity, activity.profile().begin_endpoint)).await
    }

    async fn end(&self, activity: Activity) -> Result<SessionReply, TransportError> {
        self.get_json(self.url(activity, activity.profile().end_endpoint)).await
    }

    async fn reset_counters(&self, activity: Activity) -> Result<SessionReply, TransportError> {
        self.get_json(self.url(activity, activity.profile().reset_endpoint)).await
    }

    async fn get_stats(&self, activity: Activity) -> Result<Value, TransportError> {
        self.get_json(self.url(activity, "get_stats")).await
    }

    async fn cleanup(&self, activity: Activity) -> Result<(), TransportError> {
        let url = self.url(activity, "cleanup");
        debug!("POST {}", url);
        let resp = self.client.post(&url).send().await.map_err(|e| self.map_err(&url, e))?;
        if !resp.status().is_success() {
            return Err(TransportError::RequestFailed { reason: format!("{url}: HTTP {}", resp.status()) });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server: answers a single request, hands back its request line.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let resp = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            let text = String::from_utf8_lossy(&buf).into_owned();
            text.lines().next().unwrap_or_default().to_owned()
        });
        (base, handle)
    }

    #[test]
    fn replies_map_to_results() {
        let ok: SessionReply = serde_json::from_value(json!({"status": "success", "message": "Started"})).unwrap();
        assert_eq!(ok.accepted().unwrap(), "Started");

        let busy: SessionReply = serde_json::from_value(json!({"status": "error", "message": "busy"})).unwrap();
        let err = busy.accepted().unwrap_err();
        assert_eq!(err.to_string(), "busy");
    }

    #[test]
    fn urls_use_route_prefix_and_endpoints() {
        let api = HttpSessionApi::new("http://host:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            api.url(Activity::VerticalJump, Activity::VerticalJump.profile().begin_endpoint),
            "http://host:5000/vertical_jump/start_camera"
        );
        assert_eq!(
            api.url(Activity::HeightWeight, Activity::HeightWeight.profile().reset_endpoint),
            "http://host:5000/height_weight/reset_measurement"
        );
    }

    #[tokio::test]
    async fn begin_hits_start_endpoint() {
        let (base, server) = serve_once("200 OK", r#"{"status":"success","message":"Started"}"#).await;
        let api = HttpSessionApi::new(&base, Duration::from_secs(5)).unwrap();
        let reply = api.begin(Activity::Dumbbell).await.unwrap();
        assert_eq!(reply, SessionReply::success("Started"));
        assert_eq!(server.await.unwrap(), "GET /dumbbell/start_camera HTTP/1.1");
    }

    #[tokio::test]
    async fn get_stats_returns_raw_object() {
        let (base, server) = serve_once("200 OK", r#"{"reps":4,"feedback":"Good"}"#).await;
        let api = HttpSessionApi::new(&base, Duration::from_secs(5)).unwrap();
        let stats = api.get_stats(Activity::Situp).await.unwrap();
        assert_eq!(stats, json!({"reps": 4, "feedback": "Good"}));
        assert_eq!(server.await.unwrap(), "GET /situp/get_stats HTTP/1.1");
    }

    #[tokio::test]
    async fn non_success_status_is_request_failure() {
        let (base, _server) = serve_once("500 Internal Server Error", "{}").await;
        let api = HttpSessionApi::new(&base, Duration::from_secs(5)).unwrap();
        let err = api.end(Activity::Dumbbell).await.unwrap_err();
        assert!(matches!(err, TransportError::RequestFailed { .. }));
    }

    #[tokio::test]
    async fn cleanup_posts() {
        let (base, server) = serve_once("200 OK", "{}").await;
        let api = HttpSessionApi::new(&base, Duration::from_secs(5)).unwrap();
        api.cleanup(Activity::VerticalJump).await.unwrap();
        assert_eq!(server.await.unwrap(), "POST /vertical_jump/cleanup HTTP/1.1");
    }
}
