//! Rate limiters built on a single pending pooled timer
//!
//! ```text
//! Debounce:  call call call ......(delay)...... fn(last)
//! Throttle:  call ──► fn   call ✗  call ✗  ...(delay)...  call ──► fn
//! ```

pub mod debounce;
pub mod throttle;

pub use debounce::Debounce;
pub use throttle::Throttle;
