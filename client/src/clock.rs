//! Time source used when deriving proposal state.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Supplies the current Unix time in seconds
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock for tests and simulations. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<AtomicI64>,
}

impl FixedClock {
    /// Clock frozen at `now`
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Move the clock to `now`
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `secs`
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
