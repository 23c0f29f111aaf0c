//! System state shared over the bus.
//!
//! The master owns the state and broadcasts its code; the slave mirrors it
//! onto its LEDs but never originates one.

use core::fmt;

/// Enumerated node state carried in the first byte of a state broadcast.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SystemState {
    Normal,
    Overheat,
    Fault,
    UnexpectedVoltage,
    CommunicationLost,
    SensorDamaged,
    CommunicationFailure,
}

impl SystemState {
    /// Wire code of the state.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            SystemState::Normal => 0,
            SystemState::Overheat => 1,
            SystemState::Fault => 2,
            SystemState::UnexpectedVoltage => 3,
            SystemState::CommunicationLost => 4,
            SystemState::SensorDamaged => 5,
            SystemState::CommunicationFailure => 7,
        }
    }

    /// Decodes a wire code; unknown codes yield `None`.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SystemState::Normal),
            1 => Some(SystemState::Overheat),
            2 => Some(SystemState::Fault),
            3 => Some(SystemState::UnexpectedVoltage),
            4 => Some(SystemState::CommunicationLost),
            5 => Some(SystemState::SensorDamaged),
            7 => Some(SystemState::CommunicationFailure),
            _ => None,
        }
    }

    /// Operator-facing status line printed on the diagnostic UART.
    #[must_use]
    pub const fn status_text(self) -> &'static str {
        match self {
            SystemState::Normal => "Normal State",
            SystemState::Overheat => "OVERHEAT SHUT DOWN MOTOR!!!",
            SystemState::Fault => "Fault State",
            SystemState::UnexpectedVoltage => "UNEXPECTED VOLTAGE",
            SystemState::CommunicationLost => "COMMUNICATION LOST !!!!",
            SystemState::SensorDamaged => "SENSOR DAMAGED",
            SystemState::CommunicationFailure => "30 seconds passed communication failure",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SystemState::Normal => "normal",
            SystemState::Overheat => "overheat",
            SystemState::Fault => "fault",
            SystemState::UnexpectedVoltage => "unexpected-voltage",
            SystemState::CommunicationLost => "comm-lost",
            SystemState::SensorDamaged => "sensor-damaged",
            SystemState::CommunicationFailure => "comm-failure",
        };
        f.write_str(label)
    }
}
