//! Trailing-edge debounce: only the last call of a burst runs

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

struct PendingCall<A> {
    arg: A,
    token: CancellationToken,
}

struct DebounceState<A> {
    generation: u64,
    pending: Option<PendingCall<A>>,
}

struct DebounceInner<A> {
    delay: Duration,
    pool: TimerPool,
    runtime: Handle,
    callback: Arc<dyn Fn(A) + Send + Sync>,
    state: Mutex<DebounceState<A>>,
    is_pending: StateCell<bool>,
}

/// Runs the callback once calls have been quiet for `delay`
///
/// Each call replaces the pending argument and restarts the wait, so only the
/// last call of a burst reaches the callback. The callback runs on the
/// background unit. A zero delay runs every call synchronously.
pub struct Debounce<A: Send + 'static> {
    inner: Arc<DebounceInner<A>>,
}

impl<A: Send + 'static> Debounce<A> {
    /// Must be called inside a tokio runtime; pending waits are spawned onto it
    ///
    /// A zero `delay` disables debouncing and `call` runs the callback
    /// synchronously.
    pub fn new<F>(pool: &TimerPool, delay: Duration, callback: F) -> Result<Self, TimingError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        let runtime = TimingError::current_runtime()?;
        info!("Creating debounce with delay {:?}", delay);
        Ok(Self {
            inner: Arc::new(DebounceInner {
                delay,
                pool: pool.clone(),
                runtime,
                callback: Arc::new(callback),
                state: Mutex::new(DebounceState {
                    generation: 0,
                    pending: None,
                }),
                is_pending: StateCell::new(false),
            }),
        })
    }

    /// Replaces any pending argument with `arg` and restarts the wait
    pub fn call(&self, arg: A) {
        if self.inner.delay.is_zero() {
            (self.inner.callback)(arg);
            return;
        }

        let (generation, token) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            if let Some(previous) = state.pending.take() {
                trace!("Debounce restarted (generation {})", state.generation);
                previous.token.cancel();
            }
            let token = CancellationToken::new();
            state.pending = Some(PendingCall {
                arg,
                token: token.clone(),
            });
            self.inner.is_pending.set(true);
            (state.generation, token)
        };

        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.wait_then_fire(generation, token).await });
    }

    /// Drops the pending call; returns whether one was pending
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    /// Runs the pending call right now on the caller's thread
    pub fn flush(&self) -> bool {
        match self.inner.take_pending() {
            Some(call) => {
                call.token.cancel();
                debug!("Debounce flushed");
                (self.inner.callback)(call.arg);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.is_pending.get()
    }

    /// True from a `call` until the callback runs or the call is cancelled
    pub fn subscribe_pending(&self) -> watch::Receiver<bool> {
        self.inner.is_pending.subscribe()
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Cancels the pending call when `lifecycle` tears down
    pub fn bind<L: Lifecycle + ?Sized>(&self, lifecycle: &L) {
        let inner = Arc::downgrade(&self.inner);
        lifecycle.on_cleanup(Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.cancel();
            }
        }));
    }
}

impl<A: Send + 'static> Drop for Debounce<A> {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

impl<A: Send + 'static> DebounceInner<A> {
    fn take_pending(&self) -> Option<PendingCall<A>> {
        let mut state = self.state.lock();
        let call = state.pending.take();
        if call.is_some() {
            self.is_pending.set(false);
        }
        call
    }

    fn cancel(&self) -> bool {
        match self.take_pending() {
            Some(call) => {
                call.token.cancel();
                debug!("Debounce cancelled");
                true
            }
            None => false,
        }
    }

    async fn wait_then_fire(&self, generation: u64, token: CancellationToken) {
        if !self.pool.wait_for(self.delay, &token).await {
            return;
        }

        let arg = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let call = state.pending.take();
            if call.is_some() {
                self.is_pending.set(false);
            }
            call.map(|call| call.arg)
        };

        if let Some(arg) = arg {
            trace!("Debounce window closed, invoking callback");
            (self.callback)(arg);
        }
    }
}
