//! Tick source and free-running timeout timers.
//!
//! The periodic timer interrupt calls [`TickCounters::on_tick`], which only
//! increments counters. Every other access comes from the cooperative
//! scheduler context: a task reads a timer, compares it against its own
//! threshold and resets it when the comparison fires. Each timer has exactly
//! one consuming task.
//!
//! All counters are `u32` milliseconds and wrap after about 49.7 days
//! (2^32 ms). Differences between system ticks go through [`ticks_since`],
//! which stays correct across one wrap; a timer left unreset for that long
//! starts over from zero.

use portable_atomic::{AtomicU32, Ordering};

/// Tick count type; one tick is one millisecond on the target.
pub type Tick = u32;

/// Timeout timers driven by the tick source.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerId {
    /// Time spent above the temperature threshold before a voltage query.
    Dtc,
    /// Overheat blink window.
    Blink,
    /// Tester-mode announcement blink.
    Tester,
    /// Time since the last qualifying peer message.
    CommLost,
    /// Communication-lost indicator blink window.
    CommIndicator,
    /// Silence before the communication-failure state is reported.
    CommFailure,
    /// Temperature averaging window.
    Average,
}

impl TimerId {
    /// Number of timers tracked by [`TickCounters`].
    pub const COUNT: usize = 7;

    /// Every timer, in storage order.
    pub const ALL: [TimerId; Self::COUNT] = [
        TimerId::Dtc,
        TimerId::Blink,
        TimerId::Tester,
        TimerId::CommLost,
        TimerId::CommIndicator,
        TimerId::CommFailure,
        TimerId::Average,
    ];

    const fn index(self) -> usize {
        match self {
            TimerId::Dtc => 0,
            TimerId::Blink => 1,
            TimerId::Tester => 2,
            TimerId::CommLost => 3,
            TimerId::CommIndicator => 4,
            TimerId::CommFailure => 5,
            TimerId::Average => 6,
        }
    }
}

/// System tick plus one counter per [`TimerId`].
///
/// Counters are 32-bit atomics with relaxed ordering: the interrupt handler is
/// the only incrementer and a task is the only resetter of a given timer.
pub struct TickCounters {
    system: AtomicU32,
    timers: [AtomicU32; TimerId::COUNT],
}

impl TickCounters {
    /// Creates a counter set with every value at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            system: AtomicU32::new(0),
            timers: [
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
            ],
        }
    }

    /// Advances every counter by one tick. Safe to call from interrupt context.
    pub fn on_tick(&self) {
        self.advance(1);
    }

    /// Advances every counter by `ticks`.
    pub fn advance(&self, ticks: Tick) {
        self.system.fetch_add(ticks, Ordering::Relaxed);
        for timer in &self.timers {
            timer.fetch_add(ticks, Ordering::Relaxed);
        }
    }

    /// Current system tick (wraps at `u32::MAX`).
    #[must_use]
    pub fn now(&self) -> Tick {
        self.system.load(Ordering::Relaxed)
    }

    /// Ticks accumulated by `timer` since it was last reset.
    #[must_use]
    pub fn elapsed(&self, timer: TimerId) -> Tick {
        self.timers[timer.index()].load(Ordering::Relaxed)
    }

    /// Returns `true` once `timer` has accumulated at least `threshold` ticks.
    #[must_use]
    pub fn expired(&self, timer: TimerId, threshold: Tick) -> bool {
        self.elapsed(timer) >= threshold
    }

    /// Restarts `timer` from zero.
    pub fn reset(&self, timer: TimerId) {
        self.timers[timer.index()].store(0, Ordering::Relaxed);
    }
}

impl Default for TickCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Ticks elapsed between `earlier` and `now`, tolerant of counter wraparound.
#[must_use]
pub const fn ticks_since(now: Tick, earlier: Tick) -> Tick {
    now.wrapping_sub(earlier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_advance_together_and_reset_independently() {
        let ticks = TickCounters::new();
        ticks.advance(250);
        ticks.reset(TimerId::Blink);
        ticks.on_tick();

        assert_eq!(ticks.now(), 251);
        assert_eq!(ticks.elapsed(TimerId::CommLost), 251);
        assert_eq!(ticks.elapsed(TimerId::Blink), 1);
        assert!(ticks.expired(TimerId::CommLost, 251));
        assert!(!ticks.expired(TimerId::Blink, 2));
    }

    #[test]
    fn elapsed_math_survives_wraparound() {
        assert_eq!(ticks_since(5, u32::MAX - 4), 10);
        assert_eq!(ticks_since(100, 40), 60);
    }

    #[test]
    fn counters_wrap_after_u32_max_ticks() {
        let ticks = TickCounters::new();
        ticks.advance(u32::MAX - 9);
        let before = ticks.now();
        ticks.advance(20);

        assert_eq!(ticks.now(), 10);
        assert_eq!(ticks_since(ticks.now(), before), 20);
        assert_eq!(ticks.elapsed(TimerId::Dtc), 10);
    }
}
