mod common;

use std::time::Duration;

use common::harness;
use studytrack_lib::{Phase, SessionKind};

#[tokio::test]
async fn suspension_gap_is_reported_on_next_sample() {
    let h = harness();
    h.controller.start_timer(SessionKind::Study).await.unwrap();

    h.clock.advance_ms(60_000);
    let snapshot = h.controller.sample_now().await;

    assert_eq!(snapshot.phase, Phase::Studying);
    assert_eq!(snapshot.elapsed_ms, 60_000);
    assert_eq!(h.controller.subscribe().borrow().elapsed_ms, 60_000);
}

#[tokio::test(start_paused = true)]
async fn ticks_publish_elapsed_from_anchor() {
    let h = harness();
    let rx = h.controller.subscribe();

    h.controller.start_timer(SessionKind::Break).await.unwrap();
    assert!(h.controller.is_sampling().await);

    h.clock.advance_ms(60_000);
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let seen = *rx.borrow();
    assert_eq!(seen.phase, Phase::Break);
    assert_eq!(seen.elapsed_ms, 60_000);

    h.clock.advance_ms(2_000);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(rx.borrow().elapsed_ms, 62_000);
}

#[tokio::test(start_paused = true)]
async fn stop_halts_sampling_and_publishes_idle() {
    let h = harness();
    let mut rx = h.controller.subscribe();

    h.controller.start_timer(SessionKind::Study).await.unwrap();
    h.clock.advance_ms(3_000);
    h.controller.stop_timer().await.unwrap();
    assert!(!h.controller.is_sampling().await);

    rx.mark_unchanged();
    h.clock.advance_ms(10_000);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(!rx.has_changed().unwrap());
    let seen = *rx.borrow();
    assert_eq!(seen.phase, Phase::Idle);
    assert_eq!(seen.elapsed_ms, 0);
    assert_eq!(seen.total_study_ms, 3_000);
}

#[tokio::test(start_paused = true)]
async fn switching_keeps_a_single_sampler() {
    let h = harness();

    h.controller.start_timer(SessionKind::Study).await.unwrap();
    h.clock.advance_ms(1_000);
    h.controller.start_timer(SessionKind::Break).await.unwrap();
    assert!(h.controller.is_sampling().await);

    h.clock.advance_ms(4_000);
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let seen = *h.controller.subscribe().borrow();
    assert_eq!(seen.phase, Phase::Break);
    assert_eq!(seen.elapsed_ms, 4_000);
    assert_eq!(seen.total_study_ms, 1_000);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_sampling() {
    let h = harness();
    let mut rx = h.controller.subscribe();

    h.controller.start_timer(SessionKind::Study).await.unwrap();
    h.controller.shutdown().await;
    assert!(!h.controller.is_sampling().await);

    rx.mark_unchanged();
    h.clock.advance_ms(5_000);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!rx.has_changed().unwrap());

    // Explicit sampling still works after shutdown.
    assert_eq!(h.controller.sample_now().await.elapsed_ms, 5_000);
}
