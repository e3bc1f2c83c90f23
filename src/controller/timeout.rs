//! Single delayed fire, cancellable until it happens

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, trace};

use super::task_core::{Phase, TaskCore, Unit, UnitState};
use super::Callback;
use crate::config::TimeoutConfig;
use crate::error::TimingError;
use crate::pool::TimerPool;
use crate::reactive::{Lifecycle, StateCell};

pub(crate) struct TimeoutFlags {
    is_expired: StateCell<bool>,
}

impl UnitState for TimeoutFlags {}

/// Fires a callback once, `delay` after `start`
///
/// `is_pending` is true between `start` and either the fire or a `cancel`.
pub struct TimeoutController {
    core: Arc<TaskCore<TimeoutFlags>>,
    delay: Duration,
    callback: Callback,
    is_expired: StateCell<bool>,
}

impl TimeoutController {
    /// Must be called inside a tokio runtime, which runs the background unit
    ///
    /// A zero delay is rejected.
    pub fn new<F>(pool: &TimerPool, delay: Duration, callback: F) -> Result<Self, TimingError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        TimingError::ensure_positive(delay, "timeout delay")?;
        info!("Creating timeout controller with delay {:?}", delay);

        let is_expired = StateCell::new(false);
        let core = TaskCore::new(
            "timeout",
            pool,
            TimeoutFlags {
                is_expired: is_expired.clone(),
            },
        )?;
        Ok(Self {
            core,
            delay,
            callback: Arc::new(callback),
            is_expired,
        })
    }

    /// Uses `[timeout] delay_ms`
    pub fn from_config<F>(pool: &TimerPool, config: &TimeoutConfig, callback: F) -> Result<Self, TimingError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(pool, Duration::from_millis(config.delay_ms), callback)
    }

    /// Arms the timeout; no-op while already pending
    pub fn start(&self) -> bool {
        let delay = self.delay;
        let callback = Arc::clone(&self.callback);
        self.core.start(
            |flags| {
                flags.is_expired.set(false);
            },
            move |unit| run_timeout(unit, delay, callback),
        )
    }

    /// Aborts a pending fire; no-op when nothing is pending
    pub fn cancel(&self) -> bool {
        self.core.stop()
    }

    pub fn toggle(&self) -> bool {
        if self.core.stop() {
            false
        } else {
            self.start()
        }
    }

    /// Drops any pending fire and waits the full delay again
    ///
    /// Also re-arms after the timeout has already fired.
    pub fn reset(&self) {
        self.core.stop();
        self.start();
    }

    pub fn is_pending(&self) -> bool {
        self.core.is_running().get()
    }

    pub fn subscribe_pending(&self) -> watch::Receiver<bool> {
        self.core.is_running().subscribe()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired.get()
    }

    pub fn subscribe_expired(&self) -> watch::Receiver<bool> {
        self.is_expired.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancels the pending fire when `lifecycle` tears down
    pub fn bind<L: Lifecycle + ?Sized>(&self, lifecycle: &L) {
        self.core.bind(lifecycle);
    }
}

impl Drop for TimeoutController {
    fn drop(&mut self) {
        self.core.stop();
    }
}

async fn run_timeout(unit: Unit<TimeoutFlags>, delay: Duration, callback: Callback) {
    if !unit.sleep(delay).await {
        trace!("Timeout cancelled before firing");
        return;
    }
    let fired = unit.confirm(|phase, flags| {
        *phase = Phase::Expired;
        flags.is_expired.set(true);
    });
    if fired.is_some() {
        callback();
    }
}
