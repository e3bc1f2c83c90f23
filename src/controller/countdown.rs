//! Bounded countdown with remaining time, progress and a one-shot expiry callback
//!
//! ```text
//!           start                 remaining == 0
//! Idle ──────────────► Running ──────────────────► Expired
//!  ▲                    │  ▲                          │
//!  └──── stop (pause) ──┘  └──── start / reset ───────┘
//! ```
//!
//! `remaining` is recomputed from the elapsed time of the current running
//! segment on every tick, so ticks that arrive late never make the countdown
//! drift. Stopping freezes `remaining` at its exact value and the next start
//! resumes from there.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::task_core::{Phase, TaskCore, Unit, UnitState};
use super::Callback;
use crate::config::CountdownConfig;
use crate::error::TimingError;
use crate::pool::TimerPool;
use crate::reactive::{ComputedCell, Lifecycle, StateCell};

/// Construction options for [`CountdownController`]
#[derive(Clone, Debug)]
pub struct CountdownSettings {
    /// Total time to count down
    pub duration: Duration,
    /// How often `remaining` and `progress` are republished
    pub tick_interval: Duration,
}

impl Default for CountdownSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(60),
            tick_interval: Duration::from_millis(100),
        }
    }
}

impl CountdownSettings {
    /// Both fields from the `[countdown]` section
    pub fn from_config(config: &CountdownConfig) -> Self {
        Self {
            duration: Duration::from_millis(config.duration_ms),
            tick_interval: Duration::from_millis(config.tick_interval_ms),
        }
    }

    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }
}

/// Fraction of `total` already counted down, clamped to `[0, 1]`
pub fn progress_of(total: Duration, remaining: Duration) -> f64 {
    let total = total.as_secs_f64();
    ((total - remaining.as_secs_f64()) / total).clamp(0.0, 1.0)
}

pub(crate) struct CountdownClock {
    duration: Duration,
    remaining: StateCell<Duration>,
    is_expired: StateCell<bool>,
    // Start of the current running segment and `remaining` at that moment
    segment: Option<(Instant, Duration)>,
}

impl CountdownClock {
    fn time_left(&self) -> Duration {
        match self.segment {
            Some((started, base)) => base.saturating_sub(started.elapsed()),
            None => self.remaining.get(),
        }
    }

    fn begin_segment(&mut self) {
        if self.remaining.get().is_zero() {
            self.remaining.set(self.duration);
        }
        self.is_expired.set(false);
        self.segment = Some((Instant::now(), self.remaining.get()));
    }

    fn rewind(&mut self) {
        self.segment = None;
        self.remaining.set(self.duration);
        self.is_expired.set(false);
    }

    fn expire(&mut self) {
        self.segment = None;
        self.remaining.set(Duration::ZERO);
        self.is_expired.set(true);
    }
}

impl UnitState for CountdownClock {
    fn on_stop(&mut self) {
        let left = self.time_left();
        self.segment = None;
        self.remaining.set(left);
    }
}

enum Tick {
    Counting,
    Expired,
}

/// Counts a fixed duration down and fires an expiry callback exactly once
pub struct CountdownController {
    core: Arc<TaskCore<CountdownClock>>,
    settings: CountdownSettings,
    remaining: StateCell<Duration>,
    is_expired: StateCell<bool>,
    progress: ComputedCell<Duration, f64>,
    on_expire: Option<Callback>,
    on_tick: Option<Callback>,
}

impl CountdownController {
    /// Builds an idle countdown with the full duration remaining
    ///
    /// Must be called inside a tokio runtime, which runs the background unit.
    /// Zero `duration` or `tick_interval` is rejected.
    pub fn new(pool: &TimerPool, settings: CountdownSettings) -> Result<Self, TimingError> {
        TimingError::ensure_positive(settings.duration, "countdown duration")?;
        TimingError::ensure_positive(settings.tick_interval, "countdown tick interval")?;
        info!(
            "Creating countdown controller for {:?} (tick {:?})",
            settings.duration, settings.tick_interval
        );

        let total = settings.duration;
        let remaining = StateCell::new(total);
        let is_expired = StateCell::new(false);
        let progress = remaining.map(move |left| progress_of(total, *left));
        let core = TaskCore::new(
            "countdown",
            pool,
            CountdownClock {
                duration: total,
                remaining: remaining.clone(),
                is_expired: is_expired.clone(),
                segment: None,
            },
        )?;

        Ok(Self {
            core,
            settings,
            remaining,
            is_expired,
            progress,
            on_expire: None,
            on_tick: None,
        })
    }

    /// Callback invoked once each time the countdown reaches zero
    pub fn on_expire<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_expire = Some(Arc::new(callback));
        self
    }

    /// Callback invoked after every published tick, including the final one
    pub fn on_tick<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_tick = Some(Arc::new(callback));
        self
    }

    /// Starts or resumes counting down
    ///
    /// No-op while running. After expiry this re-arms with the full duration.
    pub fn start(&self) -> bool {
        let tick = self.settings.tick_interval;
        let on_tick = self.on_tick.clone();
        let on_expire = self.on_expire.clone();
        self.core.start(CountdownClock::begin_segment, move |unit| {
            run_countdown(unit, tick, on_tick, on_expire)
        })
    }

    /// Pauses, keeping `remaining` where it is
    pub fn stop(&self) -> bool {
        self.core.stop()
    }

    pub fn toggle(&self) -> bool {
        if self.core.stop() {
            false
        } else {
            self.start()
        }
    }

    /// Restores the full duration, clears expiry and starts from zero progress
    pub fn reset(&self) {
        self.core.stop();
        self.core.with_state(|_, clock| clock.rewind());
        debug!("Countdown rewound to {:?}", self.settings.duration);
        self.start();
    }

    pub fn remaining(&self) -> Duration {
        self.remaining.get()
    }

    /// Republished every tick while running and frozen while paused
    pub fn subscribe_remaining(&self) -> watch::Receiver<Duration> {
        self.remaining.subscribe()
    }

    /// Fraction of the duration elapsed, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.progress.get()
    }

    /// Derived cell following `remaining`
    pub fn progress_cell(&self) -> ComputedCell<Duration, f64> {
        self.progress.clone()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired.get()
    }

    pub fn subscribe_expired(&self) -> watch::Receiver<bool> {
        self.is_expired.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running().get()
    }

    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.core.is_running().subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    pub fn duration(&self) -> Duration {
        self.settings.duration
    }

    pub fn bind<L: Lifecycle + ?Sized>(&self, lifecycle: &L) {
        self.core.bind(lifecycle);
    }
}

impl Drop for CountdownController {
    fn drop(&mut self) {
        self.core.stop();
    }
}

async fn run_countdown(
    unit: Unit<CountdownClock>,
    tick: Duration,
    on_tick: Option<Callback>,
    on_expire: Option<Callback>,
) {
    loop {
        // Never sleep past zero, even with a coarse tick
        let wait = match unit.confirm(|_, clock| clock.time_left()) {
            Some(left) => left.min(tick),
            None => return,
        };
        if !unit.sleep(wait).await {
            trace!("Countdown unit cancelled");
            return;
        }

        let outcome = unit.confirm(|phase, clock| {
            let left = clock.time_left();
            if left.is_zero() {
                clock.expire();
                *phase = Phase::Expired;
                Tick::Expired
            } else {
                clock.remaining.set(left);
                Tick::Counting
            }
        });

        match outcome {
            Some(Tick::Counting) => {
                if let Some(callback) = &on_tick {
                    callback();
                }
            }
            Some(Tick::Expired) => {
                if let Some(callback) = &on_tick {
                    callback();
                }
                if let Some(callback) = &on_expire {
                    callback();
                }
                return;
            }
            None => return,
        }
    }
}
