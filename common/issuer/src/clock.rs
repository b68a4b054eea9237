use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

/// Source of the current time in Unix seconds.
///
/// Expiry checks and renewal decisions read the time through this port so
/// they can be driven by a virtual clock in tests.
pub trait Clock: Send + Sync {
    fn now_seconds(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn at(seconds: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(seconds)),
        }
    }

    /// Start from the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::at(Utc::now().timestamp())
    }

    pub fn set(&self, seconds: i64) {
        self.now.store(seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_seconds(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now_seconds())
            .finish()
    }
}
