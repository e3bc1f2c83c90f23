//! Shared start/stop machinery behind every timed controller
//!
//! A [`TaskCore`] owns the phase, the single background unit (a tokio task plus
//! its [`CancellationToken`]) and the `is_running` cell. Specializations supply
//! the unit body and a small piece of variant state `S` that lives under the
//! same lock as the phase.
//!
//! # Ordering
//!
//! ```text
//! stop():  lock ─► phase = Idle ─► is_running = false ─► unlock ─► token.cancel()
//!                                                                      │
//! unit:    select!(cancelled | fired) ◄─────────────────────────────────┘
//!          └─► pool.release(timer) ─► confirm() under lock ─► callback
//! ```
//!
//! Every unit carries the generation it was started with. `confirm` only runs
//! when that generation is still current and the phase is still `Running`, so a
//! fire that was already in flight when `stop` (or `stop` + `start`) happened
//! is dropped instead of reaching the callback.

use parking_lot::Mutex;
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::TimingError;
use crate::pool::TimerPool;
use crate::reactive::{Lifecycle, StateCell};

/// Discrete state of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No background unit
    Idle,
    /// Background unit alive
    Running,
    /// Bounded controller finished; terminal until started or reset again
    Expired,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Running => write!(f, "Running"),
            Phase::Expired => write!(f, "Expired"),
        }
    }
}

/// Variant state kept under the controller lock
pub(crate) trait UnitState: Send + 'static {
    /// Called under the lock when a running controller is stopped
    fn on_stop(&mut self) {}
}

struct ActiveUnit {
    token: CancellationToken,
    // Dropping detaches; the unit exits on its own once cancelled
    _handle: JoinHandle<()>,
}

struct CoreState<S> {
    phase: Phase,
    generation: u64,
    unit: Option<ActiveUnit>,
    variant: S,
}

pub(crate) struct TaskCore<S> {
    kind: &'static str,
    pool: TimerPool,
    runtime: Handle,
    is_running: StateCell<bool>,
    state: Mutex<CoreState<S>>,
}

impl<S: UnitState> TaskCore<S> {
    pub(crate) fn new(kind: &'static str, pool: &TimerPool, variant: S) -> Result<Arc<Self>, TimingError> {
        let runtime = TimingError::current_runtime()?;
        Ok(Arc::new(Self {
            kind,
            pool: pool.clone(),
            runtime,
            is_running: StateCell::new(false),
            state: Mutex::new(CoreState {
                phase: Phase::Idle,
                generation: 0,
                unit: None,
                variant,
            }),
        }))
    }

    pub(crate) fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub(crate) fn is_running(&self) -> &StateCell<bool> {
        &self.is_running
    }

    /// Runs `f` with the variant state under the lock
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(Phase, &mut S) -> R) -> R {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        f(state.phase, &mut state.variant)
    }

    /// Launches the background unit unless one is already running
    ///
    /// `prepare` runs under the lock right after the phase flips to `Running`,
    /// before the unit exists. Returns whether a unit was launched.
    pub(crate) fn start<P, F, Fut>(self: &Arc<Self>, prepare: P, body: F) -> bool
    where
        P: FnOnce(&mut S),
        F: FnOnce(Unit<S>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.phase == Phase::Running {
            trace!("{} already running, start ignored", self.kind);
            return false;
        }

        state.generation += 1;
        state.phase = Phase::Running;
        prepare(&mut state.variant);
        self.is_running.set(true);

        let token = CancellationToken::new();
        let unit = Unit {
            core: Arc::clone(self),
            generation: state.generation,
            token: token.clone(),
        };
        let handle = self.runtime.spawn(body(unit));
        state.unit = Some(ActiveUnit {
            token,
            _handle: handle,
        });

        debug!("{} started (generation {})", self.kind, state.generation);
        true
    }

    /// Halts the running unit; returns whether anything was running
    ///
    /// Never waits for the unit to exit.
    pub(crate) fn stop(&self) -> bool {
        let unit = {
            let mut state = self.state.lock();
            if state.phase != Phase::Running {
                trace!("{} not running, stop ignored", self.kind);
                return false;
            }
            state.phase = Phase::Idle;
            state.variant.on_stop();
            self.is_running.set(false);
            state.unit.take()
        };

        // Flag is already down; a fire racing with this is dropped by confirm()
        if let Some(unit) = unit {
            unit.token.cancel();
        }
        debug!("{} stopped", self.kind);
        true
    }

    /// Registers a teardown cleanup that stops this controller
    pub(crate) fn bind<L: Lifecycle + ?Sized>(self: &Arc<Self>, lifecycle: &L) {
        let core = Arc::downgrade(self);
        lifecycle.on_cleanup(Box::new(move || {
            if let Some(core) = core.upgrade() {
                core.stop();
            }
        }));
    }
}

/// Handle given to a background unit body
pub(crate) struct Unit<S> {
    core: Arc<TaskCore<S>>,
    generation: u64,
    token: CancellationToken,
}

impl<S: UnitState> Unit<S> {
    /// The unit's only suspension point
    ///
    /// Returns `true` when the timer fired, `false` once cancelled.
    pub(crate) async fn sleep(&self, duration: Duration) -> bool {
        self.core.pool.wait_for(duration, &self.token).await
    }

    /// Runs `f` under the lock if this unit is still the live one
    ///
    /// `f` may move the phase off `Running` to finish the controller; the unit
    /// is then detached and `is_running` drops in the same critical section.
    /// Returns `None` when the unit has been superseded or stopped.
    pub(crate) fn confirm<R>(&self, f: impl FnOnce(&mut Phase, &mut S) -> R) -> Option<R> {
        let mut guard = self.core.state.lock();
        let state = &mut *guard;
        if state.generation != self.generation || state.phase != Phase::Running {
            trace!(
                "{} unit (generation {}) superseded, skipping",
                self.core.kind,
                self.generation
            );
            return None;
        }

        let result = f(&mut state.phase, &mut state.variant);
        if state.phase != Phase::Running {
            state.unit = None;
            self.core.is_running.set(false);
            debug!("{} finished as {}", self.core.kind, state.phase);
        }
        Some(result)
    }
}
