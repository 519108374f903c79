//! Tagged, bidirectional message channel to the analysis service.
//!
//! One channel per process, shared by every activity. Outbound messages are
//! frames tagged with the activity's frame tag; inbound messages are routed
//! by event name to whichever activity registered for it.
//!
//! ```text
//!  send_frame(tag, frame) ──► writer ──► server
//!                                          │
//!  route("processed_x") ◄── recv loop ◄────┘
//!        (mpsc, 32 deep)      "error" → every route
//!                             EOF     → Closed on every route, routes cleared
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fitstream_core::{EncodedFrame, ProcessedFrame, TransportError};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::tls;
use crate::wire::{read_msg, write_msg, InboundMessage, OutboundFrame, ERROR_EVENT};

/// Depth of each per-event route.
pub const ROUTE_CAPACITY: usize = 32;

/// What a route subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A processed frame with the stats object that travelled with it.
    Processed { event: String, frame: ProcessedFrame, stats: Value },
    /// Channel-level or per-message error. Carries no correlation id.
    Error { message: String },
    /// The connection ended; no further events follow.
    Closed,
}

type Routes = Arc<Mutex<HashMap<String, mpsc::Sender<ChannelEvent>>>>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

fn lock(routes: &Routes) -> MutexGuard<'_, HashMap<String, mpsc::Sender<ChannelEvent>>> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── StreamChannel ─────────────────────────────────────────────────────────────

pub struct StreamChannel {
    writer: tokio::sync::Mutex<BoxWriter>,
    routes: Routes,
    open: Arc<AtomicBool>,
    recv_task: JoinHandle<()>,
    frames_sent: AtomicU64,
    peer: String,
}

impl StreamChannel {
    /// Connect over TCP (optionally TLS) to `host:port`.
    pub async fn connect(addr: &str, tls: bool) -> Result<Self, TransportError> {
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectFailed { reason: format!("TCP connect to {addr}: {e}") })?;
        tcp.set_nodelay(true)?;

        let channel = if tls {
            let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
            let host = host.trim_start_matches('[').trim_end_matches(']');
            Self::from_stream(tls::handshake(host, tcp).await?, addr)
        } else {
            Self::from_stream(tcp, addr)
        };
        info!("Stream channel connected to {} (tls={})", addr, tls);
        Ok(channel)
    }

    /// Wrap an already-connected byte stream and start the receive loop.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let peer = peer.into();
        let (reader, writer) = tokio::io::split(stream);
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let open = Arc::new(AtomicBool::new(true));

        let recv_task = tokio::spawn(recv_loop(reader, Arc::clone(&routes), Arc::clone(&open), peer.clone()));

        Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            routes,
            open,
            recv_task,
            frames_sent: AtomicU64::new(0),
            peer,
        }
    }

    /// Register for inbound events named `event`. Replaces any earlier
    /// registration for the same name. On a closed channel the receiver
    /// yields `Closed` and then ends.
    pub fn route(&self, event: &str) -> mpsc::Receiver<ChannelEvent> {
        let (tx, rx) = mpsc::channel(ROUTE_CAPACITY);
        // Under the table lock: either the final Closed broadcast reaches
        // this route or `open` already reads false.
        let mut table = lock(&self.routes);
        if !self.is_open() {
            debug!("Route '{}' requested on a closed channel", event);
            let _ = tx.try_send(ChannelEvent::Closed);
            return rx;
        }
        if table.insert(event.to_owned(), tx).is_some() {
            debug!("Route '{}' replaced", event);
        }
        rx
    }

    pub fn unroute(&self, event: &str) {
        lock(&self.routes).remove(event);
    }

    /// Send one encoded frame tagged `tag`.
    pub async fn send_frame(&self, tag: &str, frame: &EncodedFrame) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        let msg = OutboundFrame { tag: tag.to_owned(), image: frame.to_data_url() };
        let mut writer = self.writer.lock().await;
        write_msg(&mut *writer, &msg).await?;
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

// ── Background receive loop ───────────────────────────────────────────────────

async fn recv_loop<R>(mut reader: R, routes: Routes, open: Arc<AtomicBool>, peer: String)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_msg::<InboundMessage>(&mut reader).await {
            Ok(msg) => dispatch(&routes, msg),
            Err(TransportError::ReceiveFailed { reason }) => {
                warn!("Stream channel ({}): {}", peer, reason);
                broadcast(&routes, ChannelEvent::Error { message: reason });
            }
            Err(TransportError::ConnectionClosed) => {
                info!("Stream channel closed by {}", peer);
                break;
            }
            Err(e) => {
                warn!("Stream channel receive error ({}): {}", peer, e);
                break;
            }
        }
    }

    open.store(false, Ordering::Release);
    broadcast(&routes, ChannelEvent::Closed);
    lock(&routes).clear();
}

fn dispatch(routes: &Routes, mut msg: InboundMessage) {
    if msg.tag == ERROR_EVENT {
        let message = msg.message.take().unwrap_or_else(|| "unknown server error".to_owned());
        warn!("Server error event: {}", message);
        broadcast(routes, ChannelEvent::Error { message });
        return;
    }

    let mut table = lock(routes);
    let Some(tx) = table.get(&msg.tag) else {
        debug!("No route for '{}', dropping", msg.tag);
        return;
    };

    let event = match msg.image.take() {
        Some(image) => {
            let stats = msg.take_stats();
            ChannelEvent::Processed { event: msg.tag.clone(), frame: ProcessedFrame::new(image), stats }
        }
        None => ChannelEvent::Error { message: format!("'{}' arrived without an image", msg.tag) },
    };

    match tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => warn!("Route '{}' is full, dropping event", msg.tag),
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("Route '{}' has no subscriber, removing", msg.tag);
            table.remove(&msg.tag);
        }
    }
}

fn broadcast(routes: &Routes, event: ChannelEvent) {
    let table = lock(routes);
    for (name, tx) in table.iter() {
        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
            warn!("Route '{}' is full, dropping {:?}", name, event);
        }
    }
}
