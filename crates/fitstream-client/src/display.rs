//! Display sinks. Every operation is last-write-wins: a new call fully
//! replaces what the previous one showed.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use fitstream_core::{ProcessedFrame, SessionState, StatsSnapshot};
use tracing::{debug, info, warn};

pub trait DisplaySink: Send + Sync {
    /// A processed frame together with the metrics computed on it.
    fn show_processed(&self, frame: &ProcessedFrame, stats: &StatsSnapshot);

    fn show_stats(&self, stats: &StatsSnapshot);

    /// Remaining session time, `m:ss`.
    fn show_timer(&self, text: &str);

    fn show_state(&self, state: SessionState);

    /// Something the user must see (start failures and the like).
    fn notify_user(&self, message: &str);
}

// ── ConsoleDisplay ────────────────────────────────────────────────────────────

/// Logs labels through `tracing`, prints notifications to stderr and can
/// mirror the latest processed frame to a JPEG file.
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    frame_out: Option<PathBuf>,
    last_labels: Mutex<String>,
}

impl ConsoleDisplay {
    pub fn new(frame_out: Option<PathBuf>) -> Self {
        Self { frame_out, last_labels: Mutex::new(String::new()) }
    }

    /// Log stats only when the rendered labels changed.
    fn log_stats(&self, stats: &StatsSnapshot) {
        let rendered = stats.to_string();
        let mut last = self.last_labels.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != rendered {
            info!("Stats[{}] {}", stats.activity(), rendered);
            *last = rendered;
        }
    }
}

impl DisplaySink for ConsoleDisplay {
    fn show_processed(&self, frame: &ProcessedFrame, stats: &StatsSnapshot) {
        if let Some(path) = &self.frame_out {
            match frame.decode() {
                Some(jpeg) => {
                    if let Err(e) = std::fs::write(path, &jpeg) {
                        warn!("Writing frame to {}: {}", path.display(), e);
                    }
                }
                None => debug!("Processed frame payload is not base64"),
            }
        }
        self.log_stats(stats);
    }

    fn show_stats(&self, stats: &StatsSnapshot) {
        self.log_stats(stats);
    }

    fn show_timer(&self, text: &str) {
        debug!("Timer {}", text);
    }

    fn show_state(&self, state: SessionState) {
        info!("{}", state);
    }

    fn notify_user(&self, message: &str) {
        eprintln!("⚠  {message}");
    }
}

// ── MemoryDisplay ─────────────────────────────────────────────────────────────

/// What a [`MemoryDisplay`] currently shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayState {
    pub frame: Option<ProcessedFrame>,
    pub stats: Option<StatsSnapshot>,
    pub timer: Option<String>,
    pub state: SessionState,
    pub notifications: Vec<String>,
    pub frames_shown: u64,
    pub stats_updates: u64,
}

/// Keeps the last value of everything; for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryDisplay {
    inner: Mutex<DisplayState>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DisplayState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplaySink for MemoryDisplay {
    fn show_processed(&self, frame: &ProcessedFrame, stats: &StatsSnapshot) {
        let mut s = self.lock();
        s.frame = Some(frame.clone());
        s.stats = Some(stats.clone());
        s.frames_shown += 1;
        s.stats_updates += 1;
    }

    fn show_stats(&self, stats: &StatsSnapshot) {
        let mut s = self.lock();
        s.stats = Some(stats.clone());
        s.stats_updates += 1;
    }

    fn show_timer(&self, text: &str) {
        self.lock().timer = Some(text.to_owned());
    }

    fn show_state(&self, state: SessionState) {
        self.lock().state = state;
    }

    fn notify_user(&self, message: &str) {
        self.lock().notifications.push(message.to_owned());
    }
}
