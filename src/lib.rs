//! Reactive timing primitives over a pooled timer resource
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │          TimerPool           │  acquire / release
//!                 └──────────────▲───────────────┘
//!        ┌───────────────┬───────┴───────┬───────────────┐
//!   Interval        Countdown        Timeout      Debounce / Throttle
//!        └───────────────┴───────┬───────┴───────────────┘
//!                     StateCell / ComputedCell  ──► subscribers
//!                     Lifecycle (teardown)      ──► stop / cancel
//! ```
//!
//! - [`pool`] - shared pool of re-armable single-shot timers
//! - [`controller`] - interval, countdown and timeout state machines
//! - [`limiter`] - debounce and throttle
//! - [`reactive`] - observable cells and teardown scopes
//! - [`config`] - TOML defaults for all of the above

pub mod config;
pub mod controller;
pub mod error;
pub mod limiter;
pub mod pool;
pub mod reactive;

pub use config::TimingConfig;
pub use controller::{
    CountdownController, CountdownSettings, IntervalController, IntervalSettings, Phase,
    TimeoutController,
};
pub use error::TimingError;
pub use limiter::{Debounce, Throttle};
pub use pool::{PoolStats, PooledTimer, TimerPool};
pub use reactive::{ComputedCell, Lifecycle, StateCell, TeardownScope};
