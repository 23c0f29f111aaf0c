//! Node-loop liveness for the independent watchdog.
//!
//! The node task counts its scheduler passes; the watchdog task only pets the
//! IWDG when the count moved since its last look. A collaborator call that
//! never returns (flash erase, ADC conversion) stops the count and the board
//! resets.

use portable_atomic::{AtomicU32, Ordering};

/// Scheduler passes completed by the node task.
pub struct PassCounter {
    passes: AtomicU32,
}

impl PassCounter {
    pub const fn new() -> Self {
        Self {
            passes: AtomicU32::new(0),
        }
    }

    pub fn record(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u32 {
        self.passes.load(Ordering::Relaxed)
    }
}

/// Watchdog-side view of a [`PassCounter`].
pub struct ProgressCheck {
    last: Option<u32>,
}

impl ProgressCheck {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// `true` when passes were recorded since the previous call.
    pub fn advanced(&mut self, counter: &PassCounter) -> bool {
        let now = counter.count();
        let moved = self.last != Some(now);
        self.last = Some(now);
        moved
    }
}
