//! Timed controllers: interval, countdown and timeout
//!
//! All three share one state machine ([`task_core`]):
//!
//! ```text
//! Idle ──start──► Running ──stop──► Idle
//!                    │
//!                    └──(bounded variants finish)──► Expired ──start/reset──► Running
//! ```
//!
//! - [`interval`] - callback every period until stopped
//! - [`countdown`] - bounded duration with `remaining`, `progress`, `is_expired`
//! - [`timeout`] - one delayed fire
//!
//! Control operations are synchronous and never block on the background unit.
//! Controllers must be built inside a tokio runtime; the background unit is
//! spawned onto that runtime.

pub mod countdown;
pub mod interval;
pub mod task_core;
pub mod timeout;

use std::sync::Arc;

pub use countdown::{progress_of, CountdownController, CountdownSettings};
pub use interval::{IntervalController, IntervalSettings};
pub use task_core::Phase;
pub use timeout::TimeoutController;

/// Shared callback handed to background units
pub type Callback = Arc<dyn Fn() + Send + Sync + 'static>;
