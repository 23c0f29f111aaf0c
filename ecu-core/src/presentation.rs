//! LED and UART sinks.
//!
//! The fault and protocol logic only decide *what* to show; boards implement
//! [`Indicators`] and [`Console`] to show it. [`LedPanel`] sits in front of the
//! indicator sink and forwards transitions only, so a task that re-asserts the
//! same pattern every pass does not hammer the GPIO driver.

use core::fmt;

/// Status LEDs. `White` is the combined red/green/blue drive on boards with
/// a single RGB package.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Led {
    Red,
    Green,
    Blue,
    White,
}

impl Led {
    pub const ALL: [Led; 4] = [Led::Red, Led::Green, Led::Blue, Led::White];

    const fn index(self) -> usize {
        match self {
            Led::Red => 0,
            Led::Green => 1,
            Led::Blue => 2,
            Led::White => 3,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Led::Red => "red",
            Led::Green => "green",
            Led::Blue => "blue",
            Led::White => "white",
        }
    }
}

/// Drive pattern for one LED. Blinking cadence is the sink's concern.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LedState {
    Off,
    On,
    Blink,
}

impl LedState {
    #[must_use]
    pub const fn is_lit(self) -> bool {
        !matches!(self, LedState::Off)
    }
}

/// LED driver collaborator.
pub trait Indicators {
    fn set(&mut self, led: Led, state: LedState);
}

/// Diagnostic UART collaborator: formatted output plus non-blocking input.
pub trait Console: fmt::Write {
    /// Returns the next received byte, if one is waiting.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Writes one `\r\n`-terminated line. Output is best-effort.
pub fn print_line<C: Console + ?Sized>(console: &mut C, args: fmt::Arguments<'_>) {
    let _ = console.write_fmt(args);
    let _ = console.write_str("\r\n");
}

/// Remembers the last pattern per LED and forwards changes to the sink.
pub struct LedPanel<I> {
    sink: I,
    current: [LedState; 4],
}

impl<I: Indicators> LedPanel<I> {
    /// Wraps `sink`, driving every LED off.
    pub fn new(mut sink: I) -> Self {
        for led in Led::ALL {
            sink.set(led, LedState::Off);
        }
        Self {
            sink,
            current: [LedState::Off; 4],
        }
    }

    /// Applies `state` to `led` if it differs from the current pattern.
    pub fn set(&mut self, led: Led, state: LedState) {
        let slot = &mut self.current[led.index()];
        if *slot != state {
            *slot = state;
            self.sink.set(led, state);
        }
    }

    pub fn on(&mut self, led: Led) {
        self.set(led, LedState::On);
    }

    pub fn off(&mut self, led: Led) {
        self.set(led, LedState::Off);
    }

    pub fn blink(&mut self, led: Led) {
        self.set(led, LedState::Blink);
    }

    /// Current pattern of `led`.
    #[must_use]
    pub const fn state(&self, led: Led) -> LedState {
        self.current[led.index()]
    }

    pub fn sink(&self) -> &I {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut I {
        &mut self.sink
    }
}
