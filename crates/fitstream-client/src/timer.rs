//! Session countdown.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::controller::ControlEvent;
use crate::display::DisplaySink;
use crate::liveness::SessionToken;

/// `m:ss`, seconds zero-padded.
pub fn format_remaining(ticks: u32) -> String {
    format!("{}:{:02}", ticks / 60, ticks % 60)
}

pub struct SessionTimer {
    bound: u32,
    tick: Duration,
    remaining: Arc<AtomicU32>,
    task: Option<JoinHandle<()>>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionTimer {
    pub fn new(bound: u32, tick: Duration) -> Self {
        Self { bound, tick, remaining: Arc::new(AtomicU32::new(bound)), task: None, started_at: None }
    }

    /// Restart the countdown from the bound. Each tick publishes the
    /// remaining time; reaching zero sends one `TimerExpired` and ends the task.
    pub fn start(
        &mut self,
        token: SessionToken,
        events: mpsc::UnboundedSender<ControlEvent>,
        display: Arc<dyn DisplaySink>,
    ) {
        self.stop();
        self.remaining.store(self.bound, Ordering::Release);
        self.started_at = Some(Utc::now());
        display.show_timer(&format_remaining(self.bound));

        let remaining = Arc::clone(&self.remaining);
        let tick = self.tick;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !token.is_live() {
                    return;
                }
                let left = match remaining.fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1)) {
                    Ok(prev) => prev - 1,
                    Err(_) => 0,
                };
                display.show_timer(&format_remaining(left));
                if left == 0 {
                    info!("Session {} timer expired", token.id());
                    let _ = events.send(ControlEvent::TimerExpired { session: token.id() });
                    return;
                }
            }
        }));
        debug!("Timer started ({} ticks of {:?})", self.bound, self.tick);
    }

    /// Cancel the tick source. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Cancel and restore the full bound.
    pub fn reset(&mut self) {
        self.stop();
        self.remaining.store(self.bound, Ordering::Release);
        self.started_at = None;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn formatted(&self) -> String {
        format_remaining(self.remaining())
    }

    pub fn bound(&self) -> u32 {
        self.bound
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
