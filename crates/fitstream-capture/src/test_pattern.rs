//! Synthetic camera: a diagonal gradient that scrolls one step per frame.
//! Lets the whole pipeline run headless (CI, demos) with the same timing as a
//! real device.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::{FrameSlot, RawFrame};

pub(crate) fn spawn(width: u32, height: u32, fps: u32, tx: watch::Sender<FrameSlot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_millis(1_000 / fps.max(1) as u64);
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut index: u64 = 0;

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                debug!("Test pattern: no readers left, stopping");
                break;
            }
            let frame = render(width, height, index, index * period.as_millis() as u64);
            tx.send_replace(Some(Arc::new(frame)));
            index = index.wrapping_add(1);
        }
    })
}

fn render(width: u32, height: u32, index: u64, pts_ms: u64) -> RawFrame {
    let shift = (index % 256) as u32;
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255 / width.max(1)) + shift) % 256;
            let g = ((y * 255 / height.max(1)) + shift / 2) % 256;
            let b = (r + g) / 2;
            data.extend_from_slice(&[r as u8, g as u8, b as u8]);
        }
    }
    RawFrame { data, width, height, pts_ms }
}
