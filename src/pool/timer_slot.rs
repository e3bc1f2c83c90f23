//! Re-armable single-shot timer with compile-time checkout state
//!
//! A slot is either parked in the pool (`Idle`) or checked out by exactly one
//! owner (`Armed`). The only way between the two is through
//! [`TimerPool`](super::TimerPool), which re-programs the deadline on the way out
//! and drains any unconsumed fire on the way back in.
//!
//! ```text
//! allocate ──► Idle ──arm(duration)──► Armed ──disarm──► Idle
//!                ▲                                         │
//!                └──────────────── pool ◄──────────────────┘
//! ```

use statum::{machine, state};
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

/// How far out an idle slot's deadline is parked
const PARKED_FOR: Duration = Duration::from_secs(60 * 60 * 24 * 365);

fn parked_deadline() -> Instant {
    Instant::now() + PARKED_FOR
}

#[state]
#[derive(Debug, Clone)]
pub enum TimerSlotState {
    Idle,  // Parked in the pool, deadline far in the future
    Armed, // Checked out, counting down towards `duration`
}

#[machine]
#[derive(Debug)]
pub struct TimerSlot<S: TimerSlotState> {
    sleep: Pin<Box<Sleep>>,
    duration: Duration,
    // Set once the current owner has observed the fire
    consumed: bool,
}

/// A timer checked out of a [`TimerPool`](super::TimerPool)
pub type PooledTimer = TimerSlot<Armed>;

impl<S: TimerSlotState> TimerSlot<S> {
    /// Duration the slot was last armed with
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl TimerSlot<Idle> {
    /// Must be called inside a runtime context, see `TimerPool::allocate`
    pub(crate) fn allocate() -> Self {
        Self::new(Box::pin(sleep_until(parked_deadline())), Duration::ZERO, false)
    }

    pub(crate) fn arm(mut self, duration: Duration) -> TimerSlot<Armed> {
        self.sleep.as_mut().reset(Instant::now() + duration);
        self.duration = duration;
        self.consumed = false;
        self.transition()
    }
}

impl TimerSlot<Armed> {
    /// Completes once the armed duration has elapsed
    ///
    /// Cancel safe: dropping the future before it completes leaves the timer
    /// armed, and awaiting again after completion returns immediately.
    pub async fn fired(&mut self) {
        self.sleep.as_mut().await;
        self.consumed = true;
    }

    pub fn is_elapsed(&self) -> bool {
        self.sleep.is_elapsed()
    }

    pub fn deadline(&self) -> Instant {
        self.sleep.deadline()
    }

    /// Parks the deadline and reports whether an elapsed fire went unobserved
    pub(crate) fn disarm(mut self) -> (TimerSlot<Idle>, bool) {
        let stale = !self.consumed && self.sleep.is_elapsed();
        self.sleep.as_mut().reset(parked_deadline());
        self.consumed = false;
        (self.transition(), stale)
    }
}
