//! Stats delivery to the display.
//!
//! Push-mode activities get their metrics only alongside processed frames
//! (handled by the inbound dispatcher). Pull-mode activities additionally
//! poll the stats endpoint on a fixed period, independent of frame cadence.

use std::sync::Arc;
use std::time::Duration;

use fitstream_core::{Activity, StatsMode, StatsSnapshot};
use fitstream_transport_client::SessionApi;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::display::DisplaySink;
use crate::liveness::SessionToken;

pub struct StatsSync {
    activity: Activity,
    task: Option<JoinHandle<()>>,
}

impl StatsSync {
    /// Pick the delivery mode from the activity table.
    pub fn start(
        activity: Activity,
        api: Arc<dyn SessionApi>,
        period: Duration,
        token: SessionToken,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        match activity.stats_mode() {
            StatsMode::Pull => Self::start_pull(activity, api, period, token, display),
            StatsMode::Push => Self::push_only(activity),
        }
    }

    pub fn start_pull(
        activity: Activity,
        api: Arc<dyn SessionApi>,
        period: Duration,
        token: SessionToken,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !token.is_live() {
                    return;
                }
                match api.get_stats(activity).await {
                    // A response that lands after teardown must not repaint.
                    Ok(_) if !token.is_live() => return,
                    Ok(raw) => display.show_stats(&StatsSnapshot::from_json(activity, &raw)),
                    Err(e) => warn!("Stats[{}]: poll failed, keeping last snapshot: {}", activity, e),
                }
            }
        });
        debug!("Stats[{}]: polling every {} ms", activity, period.as_millis());
        Self { activity, task: Some(task) }
    }

    pub fn push_only(activity: Activity) -> Self {
        debug!("Stats[{}]: push only", activity);
        Self { activity, task: None }
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Stats[{}]: polling stopped", self.activity);
        }
    }

    pub fn is_polling(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for StatsSync {
    fn drop(&mut self) {
        self.stop();
    }
}
