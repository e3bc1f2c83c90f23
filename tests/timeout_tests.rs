//! Timeout controller tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use timekeeper::{Phase, TimeoutController, TimerPool, TimingError};
use tokio::time::sleep;

fn counting(pool: &TimerPool, delay_ms: u64) -> (TimeoutController, Arc<AtomicUsize>) {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let timeout = TimeoutController::new(pool, Duration::from_millis(delay_ms), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .expect("valid timeout");
    (timeout, fired)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fires_exactly_once() {
    let pool = TimerPool::new();
    let (timeout, fired) = counting(&pool, 30);

    assert!(timeout.start());
    assert!(timeout.is_pending());
    sleep(Duration::from_millis(100)).await;

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!timeout.is_pending());
    assert!(timeout.is_expired());
    assert_eq!(timeout.phase(), Phase::Expired);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_before_expiry_prevents_the_fire() {
    let pool = TimerPool::new();
    let (timeout, fired) = counting(&pool, 50);

    timeout.start();
    sleep(Duration::from_millis(10)).await;
    assert!(timeout.cancel());
    assert!(!timeout.is_pending());

    sleep(Duration::from_millis(80)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!timeout.is_expired());
    assert_eq!(timeout.phase(), Phase::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_after_fire_is_a_no_op() {
    let pool = TimerPool::new();
    let (timeout, fired) = counting(&pool, 10);

    timeout.start();
    sleep(Duration::from_millis(60)).await;
    assert!(!timeout.cancel());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(timeout.phase(), Phase::Expired);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_while_pending_does_not_rearm() {
    let pool = TimerPool::new();
    let (timeout, fired) = counting(&pool, 60);

    timeout.start();
    sleep(Duration::from_millis(40)).await;
    assert!(!timeout.start());

    // Original deadline still holds
    sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_while_pending_restarts_the_delay() {
    let pool = TimerPool::new();
    let (timeout, fired) = counting(&pool, 80);

    timeout.start();
    sleep(Duration::from_millis(50)).await;
    timeout.reset();

    sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(timeout.is_pending());

    sleep(Duration::from_millis(80)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_after_expiry_rearms() {
    let pool = TimerPool::new();
    let (timeout, fired) = counting(&pool, 20);

    timeout.start();
    sleep(Duration::from_millis(70)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    timeout.reset();
    assert!(timeout.is_pending());
    assert!(!timeout.is_expired());
    sleep(Duration::from_millis(70)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_cell_reports_the_fire() {
    let pool = TimerPool::new();
    let (timeout, _fired) = counting(&pool, 20);
    let mut pending = timeout.subscribe_pending();

    timeout.start();
    tokio::time::timeout(Duration::from_secs(1), pending.wait_for(|pending| !*pending))
        .await
        .expect("timeout should fire")
        .expect("controller alive");
    assert!(timeout.is_expired());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_delay_is_rejected() {
    let pool = TimerPool::new();
    let result = TimeoutController::new(&pool, Duration::ZERO, || {});
    assert!(matches!(result, Err(TimingError::InvalidDuration { .. })));
}
