//! LED pattern store.
//!
//! The node writes patterns through [`PatternLeds`]; the LED task samples the
//! store on a fixed cadence and drives the pins, toggling blinking LEDs on
//! alternate phases.

use ecu_core::presentation::{Indicators, Led, LedState};
use portable_atomic::{AtomicU8, Ordering};

const OFF: u8 = 0;
const ON: u8 = 1;
const BLINK: u8 = 2;

const fn encode(state: LedState) -> u8 {
    match state {
        LedState::Off => OFF,
        LedState::On => ON,
        LedState::Blink => BLINK,
    }
}

const fn decode(raw: u8) -> LedState {
    match raw {
        ON => LedState::On,
        BLINK => LedState::Blink,
        _ => LedState::Off,
    }
}

const fn slot(led: Led) -> usize {
    match led {
        Led::Red => 0,
        Led::Green => 1,
        Led::Blue => 2,
        Led::White => 3,
    }
}

/// Current pattern of every LED.
pub struct LedPatterns {
    cells: [AtomicU8; 4],
}

impl LedPatterns {
    pub const fn new() -> Self {
        Self {
            cells: [
                AtomicU8::new(OFF),
                AtomicU8::new(OFF),
                AtomicU8::new(OFF),
                AtomicU8::new(OFF),
            ],
        }
    }

    pub fn store(&self, led: Led, state: LedState) {
        self.cells[slot(led)].store(encode(state), Ordering::Relaxed);
    }

    pub fn load(&self, led: Led) -> LedState {
        decode(self.cells[slot(led)].load(Ordering::Relaxed))
    }

    /// Pin level of `led` for the given blink phase.
    pub fn level(&self, led: Led, phase: bool) -> bool {
        match self.load(led) {
            LedState::Off => false,
            LedState::On => true,
            LedState::Blink => phase,
        }
    }
}

impl Default for LedPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Indicators`] sink that publishes into a [`LedPatterns`] store.
pub struct PatternLeds<'a> {
    patterns: &'a LedPatterns,
}

impl<'a> PatternLeds<'a> {
    pub fn new(patterns: &'a LedPatterns) -> Self {
        Self { patterns }
    }
}

impl Indicators for PatternLeds<'_> {
    fn set(&mut self, led: Led, state: LedState) {
        self.patterns.store(led, state);
    }
}
