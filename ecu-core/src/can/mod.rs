//! CAN frames and the bus collaborator.
//!
//! Frames carry an 11-bit identifier and up to eight data bytes. The bus is
//! polled per receive object: [`CanBus::receive`] hands out the newest frame
//! latched into a slot and clears its new-data flag, mirroring controllers
//! with hardware message objects.

use core::fmt;

use heapless::Vec;

pub mod mailbox;
pub mod protocol;

/// Maximum classic CAN payload.
pub const MAX_DATA_LEN: usize = 8;

/// 11-bit standard identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StandardId(u16);

impl StandardId {
    pub const MAX: u16 = 0x7FF;

    /// Returns `None` when `raw` does not fit in 11 bits.
    #[must_use]
    pub const fn new(raw: u16) -> Option<Self> {
        if raw <= Self::MAX { Some(Self(raw)) } else { None }
    }

    /// Identifier for protocol constants; rejects out-of-range values at
    /// compile time.
    #[must_use]
    pub const fn from_const(raw: u16) -> Self {
        assert!(raw <= Self::MAX, "standard identifier out of range");
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for StandardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#05x}", self.0)
    }
}

/// Data frames carry a payload; remote frames request one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameKind {
    Data,
    Remote,
}

/// Frame construction errors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameError {
    PayloadTooLong(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::PayloadTooLong(len) => {
                write!(f, "payload of {len} bytes exceeds {MAX_DATA_LEN}")
            }
        }
    }
}

/// A classic CAN frame with a standard identifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CanFrame {
    pub id: StandardId,
    pub kind: FrameKind,
    data: Vec<u8, MAX_DATA_LEN>,
}

impl CanFrame {
    /// Builds a data frame.
    ///
    /// # Errors
    /// Returns [`FrameError::PayloadTooLong`] for payloads over eight bytes.
    pub fn data(id: StandardId, payload: &[u8]) -> Result<Self, FrameError> {
        let data = Vec::from_slice(payload).map_err(|_| FrameError::PayloadTooLong(payload.len()))?;
        Ok(Self {
            id,
            kind: FrameKind::Data,
            data,
        })
    }

    /// Builds a remote (request) frame.
    #[must_use]
    pub const fn remote(id: StandardId) -> Self {
        Self {
            id,
            kind: FrameKind::Remote,
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// First payload byte, the only one the protocol interprets.
    #[must_use]
    pub fn first_byte(&self) -> Option<u8> {
        self.data.first().copied()
    }

    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self.kind, FrameKind::Remote)
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FrameKind::Remote => write!(f, "{} RTR", self.id),
            FrameKind::Data => {
                write!(f, "{} [", self.id)?;
                for (index, byte) in self.data.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{byte:02X}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Message-object slot number local to one node (1–32).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct ObjectSlot(u8);

impl ObjectSlot {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 32;

    #[must_use]
    pub const fn new(raw: u8) -> Option<Self> {
        if raw >= Self::MIN && raw <= Self::MAX {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Slot for compile-time object tables.
    #[must_use]
    pub const fn from_const(raw: u8) -> Self {
        assert!(raw >= Self::MIN && raw <= Self::MAX, "object slot out of range");
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Transport errors reported by bus adapters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusError {
    /// Transmission is disabled on this node.
    Disabled,
    /// The transmit queue cannot take another frame.
    QueueFull,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Disabled => f.write_str("transmitter disabled"),
            BusError::QueueFull => f.write_str("transmit queue full"),
        }
    }
}

/// CAN controller collaborator.
pub trait CanBus {
    type Error: fmt::Debug;

    /// Queues `frame` for transmission.
    ///
    /// # Errors
    /// Returns the adapter error when the frame cannot be queued, including
    /// while transmission is disabled.
    fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error>;

    /// Takes the newest unread frame latched into `slot`.
    fn receive(&mut self, slot: ObjectSlot) -> Option<CanFrame>;

    /// Enables or disables outbound transmission.
    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;
}
