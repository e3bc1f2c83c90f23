//! Leading-edge throttle: one call per cooldown window

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::TimingError;
use crate::pool::TimerPool;
use crate::reactive::{Lifecycle, StateCell};

struct CooldownState {
    generation: u64,
    // Some while cooling down
    cooldown: Option<CancellationToken>,
}

struct ThrottleInner<A> {
    delay: Duration,
    pool: TimerPool,
    runtime: Handle,
    callback: Arc<dyn Fn(A) + Send + Sync>,
    state: Mutex<CooldownState>,
    is_cooling: StateCell<bool>,
}

/// Runs the first call immediately, then drops calls until `delay` has passed
///
/// The cooldown check and the start of a new cooldown happen under one lock,
/// so of any number of concurrent calls exactly one gets through. The callback
/// runs on the caller's thread. A zero delay disables throttling.
pub struct Throttle<A> {
    inner: Arc<ThrottleInner<A>>,
}

impl<A: Send + 'static> Throttle<A> {
    /// Must be called inside a tokio runtime; cooldown timers are spawned onto it
    ///
    /// A zero `delay` disables throttling and every call executes.
    pub fn new<F>(pool: &TimerPool, delay: Duration, callback: F) -> Result<Self, TimingError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        let runtime = TimingError::current_runtime()?;
        info!("Creating throttle with delay {:?}", delay);
        Ok(Self {
            inner: Arc::new(ThrottleInner {
                delay,
                pool: pool.clone(),
                runtime,
                callback: Arc::new(callback),
                state: Mutex::new(CooldownState {
                    generation: 0,
                    cooldown: None,
                }),
                is_cooling: StateCell::new(false),
            }),
        })
    }

    /// Returns whether this call executed
    pub fn call(&self, arg: A) -> bool {
        if self.inner.delay.is_zero() {
            (self.inner.callback)(arg);
            return true;
        }

        let (generation, token) = {
            let mut state = self.inner.state.lock();
            if state.cooldown.is_some() {
                trace!("Throttled call dropped");
                return false;
            }
            state.generation += 1;
            let token = CancellationToken::new();
            state.cooldown = Some(token.clone());
            self.inner.is_cooling.set(true);
            (state.generation, token)
        };

        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.cool_down(generation, token).await });

        (self.inner.callback)(arg);
        true
    }

    /// Ends the cooldown early; returns whether one was active
    pub fn reset(&self) -> bool {
        self.inner.reset()
    }

    pub fn is_cooling(&self) -> bool {
        self.inner.is_cooling.get()
    }

    /// True while calls are being dropped
    pub fn subscribe_cooling(&self) -> watch::Receiver<bool> {
        self.inner.is_cooling.subscribe()
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Cancels the cooldown timer when `lifecycle` tears down
    pub fn bind<L: Lifecycle + ?Sized>(&self, lifecycle: &L) {
        let inner = Arc::downgrade(&self.inner);
        lifecycle.on_cleanup(Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.reset();
            }
        }));
    }
}

impl<A> Drop for Throttle<A> {
    fn drop(&mut self) {
        let cooldown = self.inner.state.lock().cooldown.take();
        if let Some(token) = cooldown {
            token.cancel();
        }
    }
}

impl<A: Send + 'static> ThrottleInner<A> {
    fn reset(&self) -> bool {
        let cooldown = {
            let mut state = self.state.lock();
            let cooldown = state.cooldown.take();
            self.is_cooling.set(false);
            cooldown
        };
        match cooldown {
            Some(token) => {
                token.cancel();
                debug!("Throttle cooldown reset");
                true
            }
            None => false,
        }
    }

    async fn cool_down(&self, generation: u64, token: CancellationToken) {
        if !self.pool.wait_for(self.delay, &token).await {
            return;
        }
        let mut state = self.state.lock();
        if state.generation == generation {
            state.cooldown = None;
            self.is_cooling.set(false);
            trace!("Throttle cooldown elapsed");
        }
    }
}
