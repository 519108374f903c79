//! Inbound dispatcher: drains one activity's channel route while running.
//! A closed channel is reported to the controller as
//! [`ControlEvent::ChannelClosed`].

use std::sync::Arc;

use fitstream_core::{Activity, StatsSnapshot};
use fitstream_transport_client::ChannelEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::controller::ControlEvent;
use crate::display::DisplaySink;
use crate::gate::BackpressureGate;
use crate::liveness::SessionToken;

/// Consecutive channel errors before the user is told.
pub const ERROR_NOTIFY_THRESHOLD: u32 = 5;

pub fn spawn(
    activity: Activity,
    mut events: mpsc::Receiver<ChannelEvent>,
    gate: Arc<BackpressureGate>,
    display: Arc<dyn DisplaySink>,
    control: mpsc::UnboundedSender<ControlEvent>,
    token: SessionToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut consecutive_errors = 0u32;

        while let Some(event) = events.recv().await {
            if !token.is_live() {
                debug!("Inbound[{}]: session {} ended, exiting", activity, token.id());
                return;
            }
            match event {
                ChannelEvent::Processed { frame, stats, .. } => {
                    gate.clear();
                    consecutive_errors = 0;
                    let snapshot = StatsSnapshot::from_json(activity, &stats);
                    trace!("Inbound[{}]: processed frame", activity);
                    display.show_processed(&frame, &snapshot);
                }
                ChannelEvent::Error { message } => {
                    gate.clear();
                    consecutive_errors += 1;
                    warn!("Inbound[{}]: channel error ({}): {}", activity, consecutive_errors, message);
                    if consecutive_errors == ERROR_NOTIFY_THRESHOLD {
                        display.notify_user(&format!("Analysis service keeps failing: {message}"));
                    }
                }
                ChannelEvent::Closed => {
                    gate.clear();
                    warn!("Inbound[{}]: channel closed", activity);
                    display.notify_user("Connection to the analysis service was lost");
                    if control.send(ControlEvent::ChannelClosed { session: token.id() }).is_err() {
                        debug!("Inbound[{}]: controller gone", activity);
                    }
                    return;
                }
            }
        }
        gate.clear();
        debug!("Inbound[{}]: route dropped", activity);
    })
}
