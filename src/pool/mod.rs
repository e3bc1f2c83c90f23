//! Pooled timer resources shared by every timing primitive
//!
//! Debouncing every keystroke or polling at a tight interval checks timers out
//! and back in at a high rate. The pool keeps released timers around and
//! re-arms them instead of allocating a new one for each activation.

pub mod timer_pool;
pub mod timer_slot;

pub use timer_pool::{PoolStats, TimerPool};
pub use timer_slot::{Armed, Idle, PooledTimer, TimerSlot, TimerSlotState};
