//! Real-clock sources for time mapping

use crate::sync::time::{RealDuration, RealTimePoint};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Monotonic real clock
///
/// All time points handed to a [`TimeController`](crate::sync::TimeController)
/// come from the clock it was built with, so a session and its renderers must
/// share one clock.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant on this clock
    fn now(&self) -> RealTimePoint;
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

static PROCESS_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic system clock measured from a process-wide epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> RealTimePoint {
        let epoch = *PROCESS_EPOCH.get_or_init(Instant::now);
        RealTimePoint::ZERO + RealDuration::from_std(epoch.elapsed())
    }
}

/// Clock that only moves when told to
///
/// Clones share the same underlying time, so a test can keep one handle and
/// advance it while the controller under test holds another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock stopped at `start`
    pub fn new(start: RealTimePoint) -> Self {
        Self {
            now_us: Arc::new(AtomicI64::new(start.get())),
        }
    }

    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }

    /// Move the clock forward (or backward, for negative durations)
    pub fn advance(&self, by: RealDuration) {
        self.now_us.fetch_add(by.get(), Ordering::SeqCst);
    }

    pub fn set(&self, to: RealTimePoint) {
        self.now_us.store(to.get(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> RealTimePoint {
        RealTimePoint::new(self.now_us.load(Ordering::SeqCst))
    }
}
