use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::timer_slot::{Idle, PooledTimer, TimerSlot};
use crate::config::PoolConfig;

/// Snapshot of pool usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots allocated because the idle set was empty
    pub created: u64,
    /// Acquisitions served from the idle set
    pub reused: u64,
    /// Timers currently checked out
    pub outstanding: usize,
    /// Releases that had to clear an elapsed but unobserved fire
    pub drained: u64,
    /// Slots currently parked in the idle set
    pub idle: usize,
}

/// Shared pool of re-armable single-shot timers
///
/// Cloning the pool clones a handle; every clone draws from the same idle set.
/// There is no global instance, callers pass the pool to whatever needs it.
///
/// # Runtime
///
/// Timers are registered with the time driver of the runtime the pool is bound
/// to: the one it was created in, the one passed to
/// [`TimerPool::with_runtime`], or else the first runtime that allocates from
/// it. Once bound, `acquire` and `release` work from any thread, including
/// plain `std::thread`s outside the runtime. Allocating from a pool that has
/// never seen a runtime panics, since a timer has no clock to run on.
///
/// # Drain before reuse
///
/// A timer may come back with its deadline already passed but the fire never
/// observed (its owner was cancelled at the same moment). [`TimerPool::release`]
/// parks the deadline and counts such a fire as drained before the slot is
/// visible to the next [`TimerPool::acquire`], which always re-programs the
/// deadline from scratch. A reused timer therefore never fires early.
#[derive(Clone, Debug)]
pub struct TimerPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    idle: Mutex<Vec<TimerSlot<Idle>>>,
    runtime: OnceLock<Handle>,
    // None retains every released slot
    max_idle: Option<usize>,
    created: AtomicU64,
    reused: AtomicU64,
    drained: AtomicU64,
    outstanding: AtomicUsize,
    idle_count: AtomicUsize,
}

impl Default for TimerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerPool {
    /// Pool that keeps every released timer
    ///
    /// Binds to the current runtime when called from inside one.
    pub fn new() -> Self {
        Self::build(None, Handle::try_current().ok())
    }

    /// Pool that keeps at most `max_idle` released timers and drops the rest
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self::build(Some(max_idle), Handle::try_current().ok())
    }

    /// Pool bound to `runtime`, usable before any code runs inside it
    pub fn with_runtime(runtime: Handle) -> Self {
        Self::build(None, Some(runtime))
    }

    /// Prewarms when `config.prewarm` is set, which needs a runtime to bind to
    pub fn from_config(config: &PoolConfig) -> Self {
        let pool = Self::build(config.max_idle, Handle::try_current().ok());
        if config.prewarm > 0 {
            pool.prewarm(config.prewarm);
        }
        pool
    }

    fn build(max_idle: Option<usize>, runtime: Option<Handle>) -> Self {
        info!(
            "Creating timer pool (max idle: {:?}, bound to runtime: {})",
            max_idle,
            runtime.is_some()
        );
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                runtime: runtime.map(OnceLock::from).unwrap_or_default(),
                max_idle,
                created: AtomicU64::new(0),
                reused: AtomicU64::new(0),
                drained: AtomicU64::new(0),
                outstanding: AtomicUsize::new(0),
                idle_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Allocates `count` idle timers ahead of demand
    ///
    /// Respects `max_idle`.
    pub fn prewarm(&self, count: usize) {
        let mut idle = self.inner.idle.lock();
        let target = match self.inner.max_idle {
            Some(max) => (idle.len() + count).min(max),
            None => idle.len() + count,
        };
        let mut allocated: u64 = 0;
        while idle.len() < target {
            idle.push(self.allocate());
            allocated += 1;
        }
        self.inner.created.fetch_add(allocated, Ordering::Relaxed);
        self.inner.idle_count.store(idle.len(), Ordering::Relaxed);
        debug!("Prewarmed timer pool with {} timers", allocated);
    }

    /// Checks out a timer that fires `duration` from now
    ///
    /// Never fails: an empty pool allocates a fresh timer. Callable from any
    /// thread once the pool is bound to a runtime.
    ///
    /// # Panics
    ///
    /// When the pool has to allocate but was never bound to a runtime and the
    /// caller is not inside one either.
    pub fn acquire(&self, duration: Duration) -> PooledTimer {
        let recycled = {
            let mut idle = self.inner.idle.lock();
            let slot = idle.pop();
            self.inner.idle_count.store(idle.len(), Ordering::Relaxed);
            slot
        };

        let slot = match recycled {
            Some(slot) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                trace!("Reusing pooled timer for {:?}", duration);
                slot
            }
            None => {
                let created = self.inner.created.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Timer pool empty, allocating timer #{}", created);
                self.allocate()
            }
        };

        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        slot.arm(duration)
    }

    /// Returns a timer to the pool
    ///
    /// Taking the timer by value makes a second release of the same checkout
    /// impossible.
    pub fn release(&self, timer: PooledTimer) {
        let duration = timer.duration();
        let (slot, stale) = timer.disarm();
        if stale {
            self.inner.drained.fetch_add(1, Ordering::Relaxed);
            debug!("Drained unobserved fire of {:?} timer on release", duration);
        }
        self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);

        let mut idle = self.inner.idle.lock();
        if let Some(max) = self.inner.max_idle {
            if idle.len() >= max {
                trace!("Idle set full ({}), dropping released timer", max);
                return;
            }
        }
        idle.push(slot);
        self.inner.idle_count.store(idle.len(), Ordering::Relaxed);
    }

    /// Waits on a pooled timer of `duration` unless `cancel` fires first
    ///
    /// Returns `true` when the timer fired. Cancellation wins a tie, in which
    /// case the elapsed fire is drained on release. The timer is back in the
    /// pool before this returns, and also when the future is dropped mid-wait
    /// (an outer `timeout`, or the runtime shutting down).
    pub async fn wait_for(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        let mut checkout = Checkout {
            pool: self,
            timer: Some(self.acquire(duration)),
        };
        let fired = match checkout.timer.as_mut() {
            Some(timer) => tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = timer.fired() => true,
            },
            None => false,
        };
        fired
    }

    /// Runtime the pool allocates on, binding the caller's runtime if unbound
    fn runtime(&self) -> Option<Handle> {
        if let Some(runtime) = self.inner.runtime.get() {
            return Some(runtime.clone());
        }
        let current = Handle::try_current().ok()?;
        debug!("Binding timer pool to the current runtime");
        Some(self.inner.runtime.get_or_init(|| current).clone())
    }

    fn allocate(&self) -> TimerSlot<Idle> {
        let runtime = self.runtime();
        if runtime.is_none() {
            warn!("Timer pool has no runtime to allocate on");
        }
        let _enter = runtime.as_ref().map(Handle::enter);
        TimerSlot::<Idle>::allocate()
    }

    /// Counter snapshot; never waits on the idle set lock
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.inner.created.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
            outstanding: self.inner.outstanding.load(Ordering::Acquire),
            drained: self.inner.drained.load(Ordering::Relaxed),
            idle: self.inner.idle_count.load(Ordering::Relaxed),
        }
    }
}

/// Releases a checked-out timer however the owning future ends
struct Checkout<'a> {
    pool: &'a TimerPool,
    timer: Option<PooledTimer>,
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            self.pool.release(timer);
        }
    }
}
