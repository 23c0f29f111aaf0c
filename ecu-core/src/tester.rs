//! Tester (diagnostic) mode.
//!
//! An operator enters tester mode with the both-buttons chord and then types
//! single-character commands on the diagnostic UART. The session here owns
//! the input parsing, the entry/exit announcement blink and the read-sensor
//! averaging; each node decides what the commands do.

use core::fmt;

use heapless::Vec;
use winnow::combinator::{alt, preceded};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use crate::presentation::{Console, LedState, print_line};
use crate::ticks::{Tick, TickCounters, TimerId};

/// Length of the entry/exit announcement blink.
pub const ANNOUNCE_TICKS: Tick = 2_000;
/// Toggle cadence of the announcement blink.
pub const ANNOUNCE_TOGGLE_TICKS: Tick = 500;
/// Bytes drained from the console per tester pass.
pub const INPUT_BURST: usize = 16;

/// Operator commands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TesterCommand {
    ReadDtc,
    ClearDtc,
    ReadSensor,
    /// Drive the peer node's diagnostic output over CAN.
    GpioPeer,
    /// Drive this node's diagnostic output.
    GpioLocal,
    Exit,
}

impl TesterCommand {
    /// Key that selects the command.
    #[must_use]
    pub const fn key(self) -> u8 {
        match self {
            TesterCommand::ReadDtc => b'1',
            TesterCommand::ClearDtc => b'2',
            TesterCommand::ReadSensor => b'3',
            TesterCommand::GpioPeer => b'4',
            TesterCommand::GpioLocal => b'5',
            TesterCommand::Exit => b'6',
        }
    }
}

/// One decoded keystroke.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TesterInput {
    Command(TesterCommand),
    Invalid(u8),
}

impl fmt::Display for TesterInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TesterInput::Command(command) => write!(f, "{command:?}"),
            TesterInput::Invalid(byte) => write!(f, "invalid {byte:#04x}"),
        }
    }
}

fn separators<'i>(input: &mut &'i [u8]) -> winnow::Result<&'i [u8]> {
    take_while(0.., (b' ', b'\t', b'\r', b'\n')).parse_next(input)
}

fn command(input: &mut &[u8]) -> winnow::Result<TesterCommand> {
    alt((
        b'1'.value(TesterCommand::ReadDtc),
        b'2'.value(TesterCommand::ClearDtc),
        b'3'.value(TesterCommand::ReadSensor),
        b'4'.value(TesterCommand::GpioPeer),
        b'5'.value(TesterCommand::GpioLocal),
        b'6'.value(TesterCommand::Exit),
    ))
    .parse_next(input)
}

fn keystroke(input: &mut &[u8]) -> winnow::Result<TesterInput> {
    preceded(
        separators,
        alt((
            command.map(TesterInput::Command),
            any.map(TesterInput::Invalid),
        )),
    )
    .parse_next(input)
}

/// Decodes every keystroke in `bytes`. Line endings and blanks are skipped;
/// anything that is not a command key is reported as invalid.
#[must_use]
pub fn parse_inputs<const N: usize>(mut bytes: &[u8]) -> Vec<TesterInput, N> {
    let mut inputs = Vec::new();
    while let Ok(input) = keystroke(&mut bytes) {
        if inputs.push(input).is_err() {
            break;
        }
    }
    inputs
}

/// Prints the command menu for ECU number `ecu` whose peer is ECU `peer`.
pub fn print_menu<C: Console + ?Sized>(console: &mut C, ecu: u8, peer: u8) {
    print_line(console, format_args!("Entering Tester Mode. Send commands:"));
    print_line(console, format_args!("1: Read DTC"));
    print_line(console, format_args!("2: Clear DTC"));
    print_line(console, format_args!("3: Read Sensor Data"));
    print_line(console, format_args!("4: Test GPIO ECU{peer}"));
    print_line(console, format_args!("5: Test GPIO ECU{ecu}"));
    print_line(console, format_args!("6: Exit Tester Mode"));
    print_line(console, format_args!("Press both buttons to exit Tester Mode."));
}

struct Sampling {
    target: u8,
    taken: u8,
    sum: u32,
}

/// State carried across tester passes.
pub struct TesterSession {
    active: bool,
    announcing: bool,
    sampling: Option<Sampling>,
}

impl TesterSession {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: false,
            announcing: false,
            sampling: None,
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Starts a session and its announcement blink.
    pub fn enter(&mut self, ticks: &TickCounters) {
        self.active = true;
        self.sampling = None;
        self.start_announcement(ticks);
    }

    /// Ends the session and starts the exit announcement blink.
    pub fn exit(&mut self, ticks: &TickCounters) {
        self.active = false;
        self.sampling = None;
        self.start_announcement(ticks);
    }

    fn start_announcement(&mut self, ticks: &TickCounters) {
        self.announcing = true;
        ticks.reset(TimerId::Tester);
    }

    #[must_use]
    pub const fn is_announcing(&self) -> bool {
        self.announcing
    }

    /// White LED pattern for this pass while an announcement is running.
    /// Returns `Some(LedState::Off)` once when it finishes, then `None`.
    pub fn announcement(&mut self, ticks: &TickCounters) -> Option<LedState> {
        if !self.announcing {
            return None;
        }
        let elapsed = ticks.elapsed(TimerId::Tester);
        if elapsed > ANNOUNCE_TICKS {
            self.announcing = false;
            return Some(LedState::Off);
        }
        if (elapsed / ANNOUNCE_TOGGLE_TICKS) % 2 == 0 {
            Some(LedState::On)
        } else {
            Some(LedState::Off)
        }
    }

    /// Drains pending console bytes and decodes them. Reading stops after the
    /// exit key; whatever follows it stays queued on the console.
    pub fn poll_input<C: Console + ?Sized>(&mut self, console: &mut C) -> Vec<TesterInput, INPUT_BURST> {
        let mut raw: Vec<u8, INPUT_BURST> = Vec::new();
        while !raw.is_full() {
            let Some(byte) = console.read_byte() else {
                break;
            };
            let _ = raw.push(byte);
            if byte == TesterCommand::Exit.key() {
                break;
            }
        }
        parse_inputs(&raw)
    }

    /// Begins averaging `target` samples; restarts a running average.
    pub fn start_sampling(&mut self, target: u8) {
        self.sampling = Some(Sampling {
            target: target.max(1),
            taken: 0,
            sum: 0,
        });
    }

    #[must_use]
    pub const fn is_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    /// Adds one sample; returns the average once the target is reached.
    pub fn sample(&mut self, value: u8) -> Option<u8> {
        let sampling = self.sampling.as_mut()?;
        sampling.sum += u32::from(value);
        sampling.taken += 1;
        if sampling.taken < sampling.target {
            return None;
        }
        let average = sampling.sum / u32::from(sampling.taken);
        self.sampling = None;
        u8::try_from(average).ok()
    }
}

impl Default for TesterSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_commands_and_noise_is_invalid() {
        let inputs: Vec<TesterInput, 8> = parse_inputs(b"1\r\n2 x6");
        assert_eq!(
            inputs.as_slice(),
            &[
                TesterInput::Command(TesterCommand::ReadDtc),
                TesterInput::Command(TesterCommand::ClearDtc),
                TesterInput::Invalid(b'x'),
                TesterInput::Command(TesterCommand::Exit),
            ]
        );
    }

    #[derive(Default)]
    struct Keys {
        pending: heapless::Deque<u8, 32>,
    }

    impl fmt::Write for Keys {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Ok(())
        }
    }

    impl Console for Keys {
        fn read_byte(&mut self) -> Option<u8> {
            self.pending.pop_front()
        }
    }

    #[test]
    fn keys_after_exit_stay_queued() {
        let mut keys = Keys::default();
        for byte in b"16\r\n3" {
            keys.pending.push_back(*byte).unwrap();
        }
        let mut session = TesterSession::new();

        let inputs = session.poll_input(&mut keys);
        assert_eq!(
            inputs.as_slice(),
            &[
                TesterInput::Command(TesterCommand::ReadDtc),
                TesterInput::Command(TesterCommand::Exit),
            ]
        );
        assert_eq!(keys.pending.len(), 3);

        let rest = session.poll_input(&mut keys);
        assert_eq!(
            rest.as_slice(),
            &[TesterInput::Command(TesterCommand::ReadSensor)]
        );
        assert!(keys.pending.is_empty());
    }

    #[test]
    fn trailing_separators_yield_nothing() {
        let inputs: Vec<TesterInput, 4> = parse_inputs(b"\r\n");
        assert!(inputs.is_empty());
    }

    #[test]
    fn announcement_toggles_then_finishes_off() {
        let ticks = TickCounters::new();
        let mut session = TesterSession::new();
        session.enter(&ticks);

        assert_eq!(session.announcement(&ticks), Some(LedState::On));
        ticks.advance(ANNOUNCE_TOGGLE_TICKS);
        assert_eq!(session.announcement(&ticks), Some(LedState::Off));
        ticks.advance(ANNOUNCE_TICKS);
        assert_eq!(session.announcement(&ticks), Some(LedState::Off));
        assert!(!session.is_announcing());
        assert_eq!(session.announcement(&ticks), None);
    }

    #[test]
    fn sampling_averages_over_target() {
        let mut session = TesterSession::new();
        session.start_sampling(3);
        assert_eq!(session.sample(20), None);
        assert_eq!(session.sample(22), None);
        assert_eq!(session.sample(27), Some(23));
        assert!(!session.is_sampling());
    }
}
