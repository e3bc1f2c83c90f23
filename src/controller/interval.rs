//! Periodic execution until stopped

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, trace};

use super::task_core::{Phase, TaskCore, Unit, UnitState};
use super::Callback;
use crate::config::IntervalConfig;
use crate::error::TimingError;
use crate::pool::TimerPool;
use crate::reactive::{Lifecycle, StateCell};

/// Construction options for [`IntervalController`]
#[derive(Clone, Debug)]
pub struct IntervalSettings {
    /// Time between two callbacks
    pub period: Duration,
    /// Start as soon as the controller is built
    pub start_immediately: bool,
    /// Invoke the callback right away on `start`, not only after one period
    pub fire_on_start: bool,
}

impl Default for IntervalSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            start_immediately: false,
            fire_on_start: false,
        }
    }
}

impl IntervalSettings {
    /// Period from `[interval] period_ms`; flags keep their defaults
    pub fn from_config(config: &IntervalConfig) -> Self {
        Self {
            period: Duration::from_millis(config.period_ms),
            ..Self::default()
        }
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Self::default()
        }
    }
}

pub(crate) struct IntervalState {
    ticks: StateCell<u64>,
}

impl UnitState for IntervalState {}

impl IntervalState {
    fn record_tick(&mut self) -> u64 {
        let next = self.ticks.get() + 1;
        self.ticks.set(next);
        next
    }
}

/// Invokes a callback every `period` until stopped
///
/// Each period is its own single-shot timer checked out of the shared
/// [`TimerPool`], so a long-running interval keeps reusing the same few timers.
pub struct IntervalController {
    core: Arc<TaskCore<IntervalState>>,
    settings: IntervalSettings,
    callback: Callback,
    ticks: StateCell<u64>,
}

impl IntervalController {
    /// Must be called inside a tokio runtime, which runs the background unit
    ///
    /// A zero period is rejected.
    pub fn new<F>(pool: &TimerPool, settings: IntervalSettings, callback: F) -> Result<Self, TimingError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        TimingError::ensure_positive(settings.period, "interval period")?;
        info!("Creating interval controller with period {:?}", settings.period);

        let ticks = StateCell::new(0);
        let core = TaskCore::new(
            "interval",
            pool,
            IntervalState {
                ticks: ticks.clone(),
            },
        )?;

        let controller = Self {
            core,
            settings,
            callback: Arc::new(callback),
            ticks,
        };
        if controller.settings.start_immediately {
            controller.start();
        }
        Ok(controller)
    }

    /// Begins ticking; no-op while already running
    pub fn start(&self) -> bool {
        self.launch(self.settings.fire_on_start)
    }

    /// Halts ticking; no-op while stopped
    pub fn stop(&self) -> bool {
        self.core.stop()
    }

    /// Returns whether the controller is running afterwards
    pub fn toggle(&self) -> bool {
        if self.core.stop() {
            false
        } else {
            self.start()
        }
    }

    /// Restarts the period so the next callback is a full period away
    ///
    /// The tick counter goes back to zero.
    pub fn reset(&self) {
        self.core.stop();
        self.ticks.set(0);
        self.launch(false);
    }

    fn launch(&self, fire_now: bool) -> bool {
        let period = self.settings.period;
        let callback = Arc::clone(&self.callback);
        self.core
            .start(|_| {}, move |unit| run_interval(unit, period, fire_now, callback))
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running().get()
    }

    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.core.is_running().subscribe()
    }

    /// Callbacks executed since construction or the last reset
    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }

    pub fn subscribe_ticks(&self) -> watch::Receiver<u64> {
        self.ticks.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    pub fn period(&self) -> Duration {
        self.settings.period
    }

    /// Stops the interval when `lifecycle` tears down
    pub fn bind<L: Lifecycle + ?Sized>(&self, lifecycle: &L) {
        self.core.bind(lifecycle);
    }
}

impl Drop for IntervalController {
    fn drop(&mut self) {
        self.core.stop();
    }
}

async fn run_interval(unit: Unit<IntervalState>, period: Duration, fire_now: bool, callback: Callback) {
    if fire_now {
        match unit.confirm(|_, state| state.record_tick()) {
            Some(_) => callback(),
            None => return,
        }
    }

    while unit.sleep(period).await {
        match unit.confirm(|_, state| state.record_tick()) {
            Some(tick) => {
                trace!("Interval tick {}", tick);
                callback();
            }
            None => return,
        }
    }
    trace!("Interval unit cancelled");
}
