use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use timekeeper::{
    CountdownController, CountdownSettings, Debounce, IntervalController, IntervalSettings,
    TeardownScope, Throttle, TimeoutController, TimerPool, TimingConfig,
};
use tokio::time::{sleep, timeout};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = TimingConfig::load_or_default().await;
    let pool = TimerPool::from_config(&config.pool);
    let scope = TeardownScope::new();

    run_interval(&pool, &scope).await?;
    run_countdown(&pool, &scope).await?;
    run_timeout(&pool, &scope).await?;
    run_limiters(&pool, &scope, &config).await?;

    info!("Tearing down demo scope");
    scope.teardown();
    // Give cancelled units a moment to hand their timers back
    sleep(Duration::from_millis(20)).await;

    let stats = pool.stats();
    info!(
        "Pool stats: created={} reused={} outstanding={} drained={} idle={}",
        stats.created, stats.reused, stats.outstanding, stats.drained, stats.idle
    );
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn run_interval(pool: &TimerPool, scope: &TeardownScope) -> Result<()> {
    let ticks = Arc::new(AtomicU64::new(0));
    let counter = ticks.clone();
    let interval = IntervalController::new(
        pool,
        IntervalSettings::with_period(Duration::from_millis(50)),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    )?;
    interval.bind(scope);

    interval.start();
    sleep(Duration::from_millis(275)).await;
    interval.stop();
    info!(
        "Interval ran {} callbacks in 275ms",
        ticks.load(Ordering::SeqCst)
    );
    Ok(())
}

async fn run_countdown(pool: &TimerPool, scope: &TeardownScope) -> Result<()> {
    let countdown = CountdownController::new(
        pool,
        CountdownSettings {
            duration: Duration::from_millis(500),
            tick_interval: Duration::from_millis(100),
        },
    )?
    .on_expire(|| info!("Countdown expired"));
    countdown.bind(scope);

    let mut progress = countdown.progress_cell();
    countdown.start();
    while !countdown.is_expired() {
        match timeout(Duration::from_secs(2), progress.changed()).await {
            Ok(Some(value)) => info!("Countdown progress {:.0}%", value * 100.0),
            Ok(None) => return Err(eyre!("Countdown dropped its remaining cell")),
            Err(_) => {
                warn!("Countdown made no progress for 2s");
                break;
            }
        }
    }
    Ok(())
}

async fn run_timeout(pool: &TimerPool, scope: &TeardownScope) -> Result<()> {
    let cancelled = TimeoutController::new(pool, Duration::from_millis(100), || {
        warn!("Cancelled timeout fired anyway")
    })?;
    cancelled.bind(scope);
    cancelled.start();
    sleep(Duration::from_millis(30)).await;
    cancelled.cancel();

    let fired = TimeoutController::new(pool, Duration::from_millis(100), || {
        info!("Timeout fired")
    })?;
    fired.bind(scope);
    fired.start();
    let mut pending = fired.subscribe_pending();
    timeout(Duration::from_secs(1), pending.wait_for(|pending| !*pending))
        .await
        .map_err(|_| eyre!("Timeout never fired"))?
        .map_err(|e| eyre!("Timeout dropped its pending cell: {}", e))?;
    Ok(())
}

async fn run_limiters(pool: &TimerPool, scope: &TeardownScope, config: &TimingConfig) -> Result<()> {
    let debounce = Debounce::new(pool, config.limiter.debounce_delay(), |query: String| {
        info!("Debounced search for '{}'", query)
    })?;
    debounce.bind(scope);
    for prefix in ["t", "ti", "tim", "time"] {
        debounce.call(prefix.to_string());
        sleep(Duration::from_millis(20)).await;
    }

    let throttle = Throttle::new(pool, config.limiter.throttle_delay(), |n: u32| {
        info!("Throttled event #{}", n)
    })?;
    throttle.bind(scope);
    let executed = (0..10).filter(|n| throttle.call(*n)).count();
    info!("Throttle let {} of 10 rapid calls through", executed);

    sleep(config.limiter.debounce_delay() + Duration::from_millis(50)).await;
    Ok(())
}
