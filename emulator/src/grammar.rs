//! Line grammar for the emulator console.
//!
//! Every command is one line: a keyword, then positional arguments separated
//! by blanks. Node arguments accept `master`/`slave`, `ecu1`/`ecu2` or the
//! bare ECU number.

use std::fmt;

use winnow::ascii::{alpha1, dec_uint, space1};
use winnow::combinator::{alt, opt, preceded};
use winnow::prelude::*;
use winnow::token::rest;

/// Which emulated board a command addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Target {
    Master,
    Slave,
}

impl Target {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Target::Master => "ECU1",
            Target::Slave => "ECU2",
        }
    }
}

/// Button levels held until the next `buttons` command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Press {
    None,
    Left,
    Right,
    Both,
}

impl Press {
    /// `(left, right)` pressed levels.
    #[must_use]
    pub const fn levels(self) -> (bool, bool) {
        match self {
            Press::None => (false, false),
            Press::Left => (true, false),
            Press::Right => (false, true),
            Press::Both => (true, true),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Advance both boards by this many ticks.
    Run(u32),
    Temperature(Target, u8),
    Voltage(Target, u8),
    Buttons(Target, Press),
    /// Bytes typed on a board's diagnostic UART.
    Keys(Target, String),
    /// Connect or cut the wire between the boards.
    Link(bool),
    Status,
    Events(Option<Target>),
    Help(Option<String>),
}

/// Input that matched no command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandError {
    pub offset: usize,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized input at column {}", self.offset + 1)
    }
}

/// Parses one console line. Surrounding blanks are ignored.
///
/// # Errors
/// Returns the column where parsing stopped when the line is not a command.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let trimmed = line.trim();
    command.parse(trimmed).map_err(|error| CommandError {
        offset: error.offset(),
    })
}

fn target(input: &mut &str) -> winnow::Result<Target> {
    alt((
        alt(("master", "ecu1", "1")).value(Target::Master),
        alt(("slave", "ecu2", "2")).value(Target::Slave),
    ))
    .parse_next(input)
}

fn press(input: &mut &str) -> winnow::Result<Press> {
    alt((
        "none".value(Press::None),
        "left".value(Press::Left),
        "right".value(Press::Right),
        "both".value(Press::Both),
    ))
    .parse_next(input)
}

fn reading(input: &mut &str) -> winnow::Result<(Target, u8)> {
    (preceded(space1, target), preceded(space1, dec_uint)).parse_next(input)
}

fn command(input: &mut &str) -> winnow::Result<Command> {
    alt((
        preceded(("run", space1), dec_uint).map(Command::Run),
        preceded("temp", reading).map(|(node, value)| Command::Temperature(node, value)),
        preceded("volt", reading).map(|(node, value)| Command::Voltage(node, value)),
        preceded(
            "buttons",
            (preceded(space1, target), preceded(space1, press)),
        )
        .map(|(node, press)| Command::Buttons(node, press)),
        preceded("key", (preceded(space1, target), preceded(space1, rest)))
            .map(|(node, keys): (Target, &str)| Command::Keys(node, keys.to_owned())),
        preceded(
            ("link", space1),
            alt(("up".value(true), "down".value(false))),
        )
        .map(Command::Link),
        "status".value(Command::Status),
        preceded("events", opt(preceded(space1, target))).map(Command::Events),
        preceded("help", opt(preceded(space1, alpha1)))
            .map(|topic: Option<&str>| Command::Help(topic.map(str::to_owned))),
    ))
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tick_runs_and_sensor_overrides() {
        assert_eq!(parse("run 5000"), Ok(Command::Run(5_000)));
        assert_eq!(
            parse("  temp slave 30 "),
            Ok(Command::Temperature(Target::Slave, 30))
        );
        assert_eq!(parse("volt 1 2"), Ok(Command::Voltage(Target::Master, 2)));
    }

    #[test]
    fn keys_keep_the_rest_of_the_line() {
        assert_eq!(
            parse("key ecu1 1 3 6"),
            Ok(Command::Keys(Target::Master, "1 3 6".to_owned()))
        );
    }

    #[test]
    fn buttons_link_and_listing_commands() {
        assert_eq!(
            parse("buttons master both"),
            Ok(Command::Buttons(Target::Master, Press::Both))
        );
        assert_eq!(parse("link down"), Ok(Command::Link(false)));
        assert_eq!(parse("events"), Ok(Command::Events(None)));
        assert_eq!(parse("events 2"), Ok(Command::Events(Some(Target::Slave))));
        assert_eq!(parse("help run"), Ok(Command::Help(Some("run".to_owned()))));
    }

    #[test]
    fn rejects_out_of_range_and_unknown_input() {
        assert!(parse("temp slave 300").is_err());
        assert!(parse("run").is_err());
        assert!(parse("buttons slave sideways").is_err());
        assert!(parse("reboot now").is_err());
    }
}
