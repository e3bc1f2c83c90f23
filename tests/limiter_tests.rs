//! Debounce and throttle tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use timekeeper::{Debounce, Throttle, TimerPool};
use tokio::time::sleep;

fn recording<A: Send + 'static>() -> (Arc<Mutex<Vec<A>>>, impl Fn(A) + Send + Sync + 'static) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    (calls, move |arg| sink.lock().push(arg))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn throttle_lets_one_call_through_per_window() {
    let pool = TimerPool::new();
    let (calls, record) = recording::<u32>();
    let throttle = Throttle::new(&pool, Duration::from_millis(100), record).expect("throttle");

    let executed: Vec<bool> = (0..5).map(|n| throttle.call(n)).collect();
    assert_eq!(executed, vec![true, false, false, false, false]);
    assert_eq!(*calls.lock(), vec![0]);
    assert!(throttle.is_cooling());

    sleep(Duration::from_millis(160)).await;
    assert!(!throttle.is_cooling());
    assert!(throttle.call(5));
    assert_eq!(*calls.lock(), vec![0, 5]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_delay_throttle_executes_everything() {
    let pool = TimerPool::new();
    let (calls, record) = recording::<u32>();
    let throttle = Throttle::new(&pool, Duration::ZERO, record).expect("throttle");

    assert!((0..5).all(|n| throttle.call(n)));
    assert_eq!(calls.lock().len(), 5);
    assert!(!throttle.is_cooling());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_throttle_calls_admit_exactly_one() {
    let pool = TimerPool::new();
    let executed = Arc::new(AtomicUsize::new(0));
    let counter = executed.clone();
    let throttle = Throttle::new(&pool, Duration::from_secs(5), move |_: usize| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .expect("throttle");

    let admitted = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for worker in 0..8 {
            let throttle = &throttle;
            let admitted = &admitted;
            scope.spawn(move || {
                for n in 0..100 {
                    if throttle.call(worker * 100 + n) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
    assert_eq!(executed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn throttle_reset_reopens_the_window() {
    let pool = TimerPool::new();
    let (calls, record) = recording::<&'static str>();
    let throttle = Throttle::new(&pool, Duration::from_secs(5), record).expect("throttle");

    assert!(throttle.call("first"));
    assert!(!throttle.call("dropped"));
    assert!(throttle.reset());
    assert!(!throttle.reset());
    assert!(throttle.call("second"));
    assert_eq!(*calls.lock(), vec!["first", "second"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_cooldown_does_not_end_a_newer_window() {
    let pool = TimerPool::new();
    let (_calls, record) = recording::<u32>();
    let throttle = Throttle::new(&pool, Duration::from_millis(60), record).expect("throttle");

    throttle.call(1);
    sleep(Duration::from_millis(40)).await;
    throttle.reset();
    throttle.call(2);

    // The first window would have ended here
    sleep(Duration::from_millis(35)).await;
    assert!(throttle.is_cooling());
    assert!(!throttle.call(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debounce_delivers_only_the_last_argument() {
    let pool = TimerPool::new();
    let (calls, record) = recording::<u32>();
    let debounce = Debounce::new(&pool, Duration::from_millis(50), record).expect("debounce");

    for n in 1..=5 {
        debounce.call(n);
    }
    assert!(debounce.is_pending());
    assert!(calls.lock().is_empty());

    sleep(Duration::from_millis(120)).await;
    assert_eq!(*calls.lock(), vec![5]);
    assert!(!debounce.is_pending());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debounce_restarts_the_wait_on_every_call() {
    let pool = TimerPool::new();
    let (calls, record) = recording::<u32>();
    let debounce = Debounce::new(&pool, Duration::from_millis(60), record).expect("debounce");

    debounce.call(1);
    sleep(Duration::from_millis(40)).await;
    debounce.call(2);

    // 80ms after the first call, only 40ms after the second
    sleep(Duration::from_millis(40)).await;
    assert!(calls.lock().is_empty());

    sleep(Duration::from_millis(70)).await;
    assert_eq!(*calls.lock(), vec![2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debounce_cancel_drops_the_pending_call() {
    let pool = TimerPool::new();
    let (calls, record) = recording::<u32>();
    let debounce = Debounce::new(&pool, Duration::from_millis(30), record).expect("debounce");

    debounce.call(1);
    assert!(debounce.cancel());
    assert!(!debounce.cancel());
    assert!(!debounce.is_pending());

    sleep(Duration::from_millis(80)).await;
    assert!(calls.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debounce_flush_runs_immediately_and_once() {
    let pool = TimerPool::new();
    let (calls, record) = recording::<u32>();
    let debounce = Debounce::new(&pool, Duration::from_millis(30), record).expect("debounce");

    debounce.call(7);
    assert!(debounce.flush());
    assert_eq!(*calls.lock(), vec![7]);
    assert!(!debounce.flush());

    sleep(Duration::from_millis(80)).await;
    assert_eq!(*calls.lock(), vec![7]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_delay_debounce_runs_synchronously() {
    let pool = TimerPool::new();
    let (calls, record) = recording::<u32>();
    let debounce = Debounce::new(&pool, Duration::ZERO, record).expect("debounce");

    debounce.call(1);
    debounce.call(2);
    assert_eq!(*calls.lock(), vec![1, 2]);
    assert!(!debounce.is_pending());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_a_debounce_cancels_it() {
    let pool = TimerPool::new();
    let (calls, record) = recording::<u32>();
    let debounce = Debounce::new(&pool, Duration::from_millis(30), record).expect("debounce");

    debounce.call(1);
    drop(debounce);
    sleep(Duration::from_millis(80)).await;
    assert!(calls.lock().is_empty());
    assert_eq!(pool.stats().outstanding, 0);
}
