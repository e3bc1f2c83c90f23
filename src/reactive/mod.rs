//! Observable cells and teardown hooks consumed by the timing primitives
//!
//! The controllers only *write* state; everything else reads it. Cells are thin
//! wrappers around [`tokio::sync::watch`] so any number of subscribers can follow
//! `is_running`, `remaining`, `progress` and friends without the controller
//! knowing about them.
//!
//! ```text
//! Controller ──set──► StateCell<T> ──subscribe──► watch::Receiver<T>
//!                          │
//!                          └──map──► ComputedCell<T, U>   (derived, recomputed on read)
//! ```

pub mod lifecycle;

pub use lifecycle::{Lifecycle, TeardownScope};

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Mutable observable value with a single writer side
pub struct StateCell<T> {
    sender: Arc<watch::Sender<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateCell").field(&*self.sender.borrow()).finish()
    }
}

impl<T> StateCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Stores `value` and wakes subscribers, but only if it actually differs
    ///
    /// Returns whether the stored value changed.
    pub fn set(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Derives a read-only cell whose value is recomputed from this one
    pub fn map<U, F>(&self, derive: F) -> ComputedCell<T, U>
    where
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        ComputedCell {
            source: self.sender.subscribe(),
            derive: Arc::new(derive),
        }
    }
}

/// Read-only value computed from a [`StateCell`]
pub struct ComputedCell<S, T> {
    source: watch::Receiver<S>,
    derive: Arc<dyn Fn(&S) -> T + Send + Sync>,
}

impl<S, T> Clone for ComputedCell<S, T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            derive: Arc::clone(&self.derive),
        }
    }
}

impl<S, T> ComputedCell<S, T> {
    pub fn get(&self) -> T {
        let source = self.source.borrow();
        (self.derive)(&*source)
    }

    /// Waits until the source cell changes and returns the recomputed value
    ///
    /// Returns `None` once the writing side is gone.
    pub async fn changed(&mut self) -> Option<T> {
        self.source.changed().await.ok()?;
        Some(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_only_real_changes() {
        let cell = StateCell::new(1u32);
        assert!(!cell.set(1));
        assert!(cell.set(2));
        assert_eq!(cell.get(), 2);
    }

    #[test]
    fn computed_cell_follows_source() {
        let cell = StateCell::new(4u32);
        let doubled = cell.map(|v| v * 2);
        assert_eq!(doubled.get(), 8);
        cell.set(5);
        assert_eq!(doubled.get(), 10);
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let cell = StateCell::new(false);
        let mut rx = cell.subscribe();
        cell.set(true);
        rx.changed().await.expect("sender alive");
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn computed_changed_yields_new_value() {
        let cell = StateCell::new(1u32);
        let mut plus_one = cell.map(|v| v + 1);
        cell.set(10);
        assert_eq!(plus_one.changed().await, Some(11));
    }
}
