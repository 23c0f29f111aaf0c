//! Shared identifier vocabulary and message codec.
//!
//! Both images agree on these identifiers and on the per-node object tables
//! at build time; nothing is negotiated on the wire. Only the first payload
//! byte carries meaning. Outbound data frames are padded to eight bytes.

use super::mailbox::{Direction, ObjectDef};
use super::{CanFrame, MAX_DATA_LEN, StandardId};
use crate::state::SystemState;

/// Liveness heartbeat sent by the master.
pub const KEEP_ALIVE: StandardId = StandardId::from_const(0x101);
/// Averaged temperature reported by the slave.
pub const TEMPERATURE: StandardId = StandardId::from_const(0x102);
/// Voltage query (remote frame) and its data-frame reply.
pub const REMOTE_VOLTAGE: StandardId = StandardId::from_const(0x104);
/// State broadcast from the master.
pub const STATE: StandardId = StandardId::from_const(0x106);
/// Diagnostic GPIO command.
pub const GPIO_CONTROL: StandardId = StandardId::from_const(0x107);

/// Marker byte carried by keep-alive frames.
pub const KEEP_ALIVE_MARKER: u8 = 0xAA;
/// GPIO command that drives the diagnostic output on.
pub const GPIO_ON: u8 = 0x06;

/// Master message objects.
pub const MASTER_OBJECTS: [ObjectDef; 7] = [
    ObjectDef::new(1, KEEP_ALIVE, Direction::Transmit),
    ObjectDef::new(2, TEMPERATURE, Direction::Receive),
    ObjectDef::new(4, REMOTE_VOLTAGE, Direction::Transmit),
    ObjectDef::new(5, REMOTE_VOLTAGE, Direction::Receive),
    ObjectDef::new(6, STATE, Direction::Transmit),
    ObjectDef::new(7, GPIO_CONTROL, Direction::Transmit),
    ObjectDef::new(8, GPIO_CONTROL, Direction::Receive),
];

/// Slave message objects.
pub const SLAVE_OBJECTS: [ObjectDef; 7] = [
    ObjectDef::new(1, KEEP_ALIVE, Direction::Receive),
    ObjectDef::new(2, TEMPERATURE, Direction::Transmit),
    ObjectDef::new(4, REMOTE_VOLTAGE, Direction::RemoteRequest),
    ObjectDef::new(5, REMOTE_VOLTAGE, Direction::Transmit),
    ObjectDef::new(6, STATE, Direction::Receive),
    ObjectDef::new(7, GPIO_CONTROL, Direction::Receive),
    ObjectDef::new(8, GPIO_CONTROL, Direction::Transmit),
];

/// Semantic message carried by a frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Message {
    KeepAlive,
    Temperature(u8),
    VoltageQuery,
    VoltageReport(u8),
    State(SystemState),
    Gpio(u8),
}

impl Message {
    /// Interprets identifier, frame kind and first payload byte.
    ///
    /// Unknown identifiers, unknown state codes and data frames that lack the
    /// byte their message needs are ignored.
    #[must_use]
    pub fn decode(frame: &CanFrame) -> Option<Self> {
        if frame.is_remote() {
            return (frame.id == REMOTE_VOLTAGE).then_some(Message::VoltageQuery);
        }
        let first = frame.first_byte();
        match frame.id {
            KEEP_ALIVE => Some(Message::KeepAlive),
            TEMPERATURE => first.map(Message::Temperature),
            REMOTE_VOLTAGE => first.map(Message::VoltageReport),
            STATE => first.and_then(SystemState::from_code).map(Message::State),
            GPIO_CONTROL => first.map(Message::Gpio),
            _ => None,
        }
    }

    /// Identifier the message travels on.
    #[must_use]
    pub const fn id(self) -> StandardId {
        match self {
            Message::KeepAlive => KEEP_ALIVE,
            Message::Temperature(_) => TEMPERATURE,
            Message::VoltageQuery | Message::VoltageReport(_) => REMOTE_VOLTAGE,
            Message::State(_) => STATE,
            Message::Gpio(_) => GPIO_CONTROL,
        }
    }

    /// Builds the outbound frame.
    #[must_use]
    pub fn encode(self) -> CanFrame {
        let first = match self {
            Message::VoltageQuery => return CanFrame::remote(self.id()),
            Message::KeepAlive => KEEP_ALIVE_MARKER,
            Message::Temperature(value) | Message::VoltageReport(value) | Message::Gpio(value) => {
                value
            }
            Message::State(state) => state.code(),
        };
        let mut payload = [0u8; MAX_DATA_LEN];
        payload[0] = first;
        match CanFrame::data(self.id(), &payload) {
            Ok(frame) => frame,
            // An eight-byte payload always fits.
            Err(_) => CanFrame::remote(self.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reads_only_the_first_byte() {
        let frame = CanFrame::data(TEMPERATURE, &[31, 0xFF, 0xFF]).unwrap();
        assert_eq!(Message::decode(&frame), Some(Message::Temperature(31)));
    }

    #[test]
    fn voltage_query_and_reply_share_an_identifier() {
        assert_eq!(
            Message::decode(&CanFrame::remote(REMOTE_VOLTAGE)),
            Some(Message::VoltageQuery)
        );
        assert_eq!(
            Message::decode(&Message::VoltageReport(2).encode()),
            Some(Message::VoltageReport(2))
        );
        assert_eq!(Message::decode(&CanFrame::remote(STATE)), None);
    }

    #[test]
    fn state_broadcast_carries_the_code_and_pads() {
        let frame = Message::State(SystemState::CommunicationFailure).encode();
        assert_eq!(frame.id, STATE);
        assert_eq!(frame.payload(), &[7, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn unknown_inputs_are_ignored() {
        let unknown = CanFrame::data(StandardId::from_const(0x300), &[1]).unwrap();
        assert_eq!(Message::decode(&unknown), None);
        let bad_state = CanFrame::data(STATE, &[6]).unwrap();
        assert_eq!(Message::decode(&bad_state), None);
        let empty = CanFrame::data(TEMPERATURE, &[]).unwrap();
        assert_eq!(Message::decode(&empty), None);
    }

    #[test]
    fn keep_alive_uses_the_marker() {
        assert_eq!(Message::KeepAlive.encode().first_byte(), Some(KEEP_ALIVE_MARKER));
    }
}
