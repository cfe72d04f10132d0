//! Tick source abstraction.
//!
//! Production code only ever asks for [`TickSource::current_tick`]. The
//! [`ManualClock`] is the logical clock used by tests and by the replay tool:
//! clones share one counter, so a test can mine ticks while a controller that
//! holds another clone observes them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::Tick;

/// A monotonically increasing source of ticks.
pub trait TickSource: Send + Sync {
    /// The current tick.
    fn current_tick(&self) -> Tick;
}

/// Shared handle to any tick source.
pub type SharedClock = Arc<dyn TickSource>;

/// Manually advanced logical clock.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    tick: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock positioned at `start`.
    pub fn new(start: Tick) -> Self {
        Self {
            tick: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Advance the clock by `n` ticks, stopping at `Tick::MAX`. Returns the
    /// new tick.
    pub fn mine_ticks(&self, n: u64) -> Tick {
        let prev = self
            .tick
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(t.saturating_add(n)))
            .unwrap_or_else(|current| current);
        let now = prev.saturating_add(n);
        tracing::trace!(ticks = n, now, "clock: mined ticks");
        now
    }

    /// Advance the clock to `target`. A target in the past leaves the clock
    /// unchanged. Returns the resulting tick.
    pub fn mine_to_tick(&self, target: Tick) -> Tick {
        let prev = self.tick.fetch_max(target, Ordering::SeqCst);
        prev.max(target)
    }

    /// Return this clock as a [`SharedClock`] handle.
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl TickSource for ManualClock {
    fn current_tick(&self) -> Tick {
        self.tick.load(Ordering::SeqCst)
    }
}
