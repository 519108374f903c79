mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{FakeSessionApi, Harness};
use fitstream_client::ControlEvent;
use fitstream_core::{Activity, ControllerError, SessionState, StatsSnapshot};
use tokio::time;

fn calls(counter: &std::sync::atomic::AtomicUsize) -> usize {
    FakeSessionApi::count(counter)
}

#[tokio::test(start_paused = true)]
async fn start_then_stop_releases_everything() {
    let mut h = Harness::new(Activity::Dumbbell);

    h.controller.start().await.expect("start");
    assert_eq!(h.controller.state(), SessionState::Running);
    assert!(h.camera.is_acquired());
    assert!(h.controller.is_sampling());
    assert!(h.controller.is_polling_stats());
    assert!(h.controller.timer().is_running());
    assert_eq!(h.display.snapshot().state, SessionState::Running);
    assert_eq!(h.display.snapshot().timer.as_deref(), Some("3:00"));

    time::sleep(Duration::from_millis(1_100)).await;
    h.controller.stop().await;

    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert!(!h.camera.is_acquired());
    assert!(!h.controller.is_sampling());
    assert!(!h.controller.is_polling_stats());
    assert!(!h.controller.timer().is_running());
    assert_eq!(calls(&h.api.end_calls), 1);
    assert_eq!(h.ctx.holder_activity(), None);

    // Nothing ticks after teardown.
    let polls = calls(&h.api.stats_calls);
    let shown = h.display.snapshot().timer;
    h.server.received();
    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(calls(&h.api.stats_calls), polls);
    assert_eq!(h.display.snapshot().timer, shown);
    assert!(h.server.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_releases_even_when_end_fails() {
    let mut h = Harness::new(Activity::Situp);
    h.api.fail_end.store(true, Ordering::SeqCst);

    h.controller.start().await.expect("start");
    h.controller.stop().await;

    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert!(!h.camera.is_acquired());
    assert!(!h.controller.is_sampling());
    assert!(!h.controller.is_polling_stats());
    assert!(!h.controller.timer().is_running());
    assert_eq!(calls(&h.api.end_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_outside_running_is_cleanup_only() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.controller.stop().await;
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(calls(&h.api.end_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn start_while_running_is_rejected() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.controller.start().await.expect("start");
    let err = h.controller.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::InvalidTransition { from: SessionState::Running, .. }));
    assert_eq!(calls(&h.api.begin_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop() {
    let mut h = Harness::new(Activity::VerticalJump);
    h.controller.start().await.expect("first start");
    h.controller.stop().await;
    h.controller.start().await.expect("second start");
    assert_eq!(h.controller.state(), SessionState::Running);
    assert_eq!(h.camera.acquires.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn reset_while_running_is_stop_plus_counter_reset() {
    let mut h = Harness::new(Activity::Dumbbell);
    *h.api.stats.lock().unwrap() = serde_json::json!({"total_reps": 9, "left_status": "Up"});

    h.controller.start().await.expect("start");
    time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(h.display.snapshot().stats.unwrap().count("total_reps"), 9);

    h.controller.reset().await.expect("reset");

    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(!h.camera.is_acquired());
    assert_eq!(calls(&h.api.end_calls), 1);
    assert_eq!(calls(&h.api.reset_calls), 1);
    let shown = h.display.snapshot();
    assert_eq!(shown.stats, Some(StatsSnapshot::defaults(Activity::Dumbbell)));
    assert_eq!(shown.timer.as_deref(), Some("3:00"));
    assert_eq!(shown.state, SessionState::Idle);
    assert_eq!(h.controller.timer().remaining(), 180);
}

#[tokio::test(start_paused = true)]
async fn failed_reset_keeps_state() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.controller.start().await.expect("start");
    h.controller.stop().await;
    h.api.fail_reset.store(true, Ordering::SeqCst);

    assert!(h.controller.reset().await.is_err());
    assert_eq!(h.controller.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_stops_exactly_once() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.controller.start().await.expect("start");

    time::sleep(Duration::from_millis(179_500)).await;
    assert_eq!(h.controller.timer().remaining(), 1);
    assert!(h.events.try_recv().is_err());

    let event = h.events.recv().await.expect("expiry event");
    assert_eq!(h.controller.timer().remaining(), 0);
    assert_eq!(h.display.snapshot().timer.as_deref(), Some("0:00"));

    assert!(h.controller.handle_event(event.clone()).await);
    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert!(!h.camera.is_acquired());
    assert_eq!(calls(&h.api.end_calls), 1);

    // A replayed expiry is stale.
    assert!(!h.controller.handle_event(event).await);
    time::sleep(Duration::from_secs(10)).await;
    assert!(h.events.try_recv().is_err());
    assert_eq!(calls(&h.api.end_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn expiry_of_an_old_session_is_ignored() {
    let mut h = Harness::new(Activity::Situp);
    h.controller.start().await.expect("start");
    h.controller.stop().await;
    h.controller.start().await.expect("restart");

    let stale = ControlEvent::TimerExpired { session: 1 };
    assert!(!h.controller.handle_event(stale).await);
    assert_eq!(h.controller.state(), SessionState::Running);
}

#[tokio::test(start_paused = true)]
async fn camera_failure_leaves_state_and_sends_nothing() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.camera.deny.store(true, Ordering::SeqCst);

    let err = h.controller.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::Capture(_)));
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(calls(&h.api.begin_calls), 0);
    assert_eq!(h.ctx.holder_activity(), None);

    let notes = h.display.snapshot().notifications;
    assert_eq!(notes.len(), 1);
    assert!(notes[0].contains("denied"));

    time::sleep(Duration::from_secs(2)).await;
    assert!(h.server.received().is_empty());
    assert_eq!(h.controller.gate_stats().sent, 0);
}

#[tokio::test(start_paused = true)]
async fn begin_rejection_releases_camera_and_surfaces_message() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.api.reject_begin("busy");

    let err = h.controller.start().await.unwrap_err();
    assert_eq!(err.to_string(), "busy");
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.camera.acquires.load(Ordering::SeqCst), 1);
    assert_eq!(h.camera.releases.load(Ordering::SeqCst), 1);
    assert!(!h.camera.is_acquired());
    assert_eq!(h.display.snapshot().notifications, vec!["Failed to start: busy".to_owned()]);

    time::sleep(Duration::from_secs(2)).await;
    assert!(h.server.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn begin_rejection_from_stopped_keeps_stopped() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.controller.start().await.expect("start");
    h.controller.stop().await;

    h.api.reject_begin("busy");
    assert!(h.controller.start().await.is_err());
    assert_eq!(h.controller.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn second_activity_cannot_take_the_camera() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.controller.start().await.expect("start");

    let (mut other, _events) = h.sibling(Activity::Situp);
    let err = other.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::DeviceBusy { holder: Activity::Dumbbell }));
    assert_eq!(other.state(), SessionState::Idle);

    // First session untouched.
    assert_eq!(h.controller.state(), SessionState::Running);
    assert!(h.camera.is_acquired());

    h.controller.stop().await;
    other.start().await.expect("free after stop");
}

#[tokio::test(start_paused = true)]
async fn shutdown_notifies_and_releases() {
    let mut h = Harness::new(Activity::VerticalJump);
    h.controller.start().await.expect("start");

    h.controller.shutdown().await;
    assert_eq!(calls(&h.api.cleanup_calls), 1);
    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert!(!h.camera.is_acquired());
    assert!(!h.controller.is_sampling());
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_bounded_when_cleanup_hangs() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.api.hang_cleanup.store(true, Ordering::SeqCst);
    h.controller.start().await.expect("start");

    let began = time::Instant::now();
    h.controller.shutdown().await;
    let took = began.elapsed();

    assert!(took >= Duration::from_millis(200) && took < Duration::from_millis(300), "took {took:?}");
    assert_eq!(calls(&h.api.cleanup_calls), 1);
    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert!(!h.camera.is_acquired());
    assert!(!h.controller.is_sampling());
    assert_eq!(h.ctx.holder_activity(), None);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_when_cleanup_fails() {
    let mut h = Harness::new(Activity::Situp);
    h.api.fail_cleanup.store(true, Ordering::SeqCst);
    h.controller.start().await.expect("start");

    h.controller.shutdown().await;
    assert_eq!(calls(&h.api.cleanup_calls), 1);
    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert!(!h.camera.is_acquired());
    assert!(!h.controller.is_polling_stats());
}

#[tokio::test(start_paused = true)]
async fn start_is_refused_once_the_channel_is_closed() {
    let mut h = Harness::new(Activity::Dumbbell);
    h.server.hang_up().await;
    h.wait_channel_closed().await;

    let err = h.controller.start().await.unwrap_err();
    assert!(matches!(err, ControllerError::ChannelClosed));
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.camera.acquires.load(Ordering::SeqCst), 0);
    assert_eq!(calls(&h.api.begin_calls), 0);
    assert_eq!(h.ctx.holder_activity(), None);
    assert_eq!(
        h.display.snapshot().notifications,
        vec!["Failed to start: Stream channel to the analysis service is closed".to_owned()]
    );
}

#[tokio::test(start_paused = true)]
async fn channel_loss_mid_session_stops_and_releases() {
    let mut h = Harness::new(Activity::VerticalJump);
    h.controller.start().await.expect("start");
    h.server.frames.recv().await.expect("first frame");

    h.server.hang_up().await;
    let event = h.events.recv().await.expect("channel closed event");
    assert!(matches!(event, ControlEvent::ChannelClosed { .. }));

    assert!(h.controller.handle_event(event).await);
    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert!(!h.camera.is_acquired());
    assert!(!h.controller.is_sampling());
    assert!(!h.controller.timer().is_running());
    assert_eq!(calls(&h.api.end_calls), 1);
    let notes = h.display.snapshot().notifications;
    assert!(notes.iter().any(|n| n.contains("lost")), "{notes:?}");

    // No camera is taken while the channel stays down.
    assert!(h.controller.start().await.is_err());
    assert_eq!(h.camera.acquires.load(Ordering::SeqCst), 1);
}
