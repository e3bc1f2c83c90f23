//! Teardown registration for owners of timing primitives

use parking_lot::Mutex;
use tracing::debug;

pub type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Anything that can run a cleanup exactly once when its owner goes away
pub trait Lifecycle {
    fn on_cleanup(&self, cleanup: Cleanup);
}

/// Collects cleanups and runs each of them exactly once on teardown
///
/// Teardown happens on an explicit [`TeardownScope::teardown`] call or on drop,
/// whichever comes first. A cleanup registered after teardown runs right away.
pub struct TeardownScope {
    // None once torn down
    cleanups: Mutex<Option<Vec<Cleanup>>>,
}

impl TeardownScope {
    pub fn new() -> Self {
        Self {
            cleanups: Mutex::new(Some(Vec::new())),
        }
    }

    pub fn teardown(&self) {
        let cleanups = self.cleanups.lock().take();
        if let Some(cleanups) = cleanups {
            debug!("Tearing down scope with {} cleanups", cleanups.len());
            // Run outside the lock so a cleanup may register further cleanups
            for cleanup in cleanups {
                cleanup();
            }
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.cleanups.lock().is_none()
    }

    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.lock().as_ref().map_or(0, Vec::len)
    }
}

impl Default for TeardownScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for TeardownScope {
    fn on_cleanup(&self, cleanup: Cleanup) {
        let mut guard = self.cleanups.lock();
        if let Some(cleanups) = guard.as_mut() {
            cleanups.push(cleanup);
            return;
        }
        drop(guard);
        debug!("Scope already torn down, running cleanup immediately");
        cleanup();
    }
}

impl Drop for TeardownScope {
    fn drop(&mut self) {
        self.teardown();
    }
}
