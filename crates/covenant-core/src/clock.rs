//! Time source abstraction
//!
//! All deadline checks in the engine read from a single injected clock, so
//! tests can drive time explicitly and embedders can supply their own
//! monotonic source.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Timestamp;

/// Externally-supplied monotonic clock
pub trait Clock: Send + Sync {
    /// Current time, Unix seconds
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by [`SystemTime`]
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Hand-driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move time forward by `secs`
    pub fn advance(&self, secs: u64) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += secs;
    }

    /// Jump to an absolute timestamp
    pub fn set(&self, ts: Timestamp) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = ts;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().expect("clock lock poisoned")
    }
}
