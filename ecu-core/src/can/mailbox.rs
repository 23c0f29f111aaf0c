//! Message-object bank.
//!
//! Each node configures a small table of objects, one per identifier it
//! exchanges. Incoming frames are latched into every receive object whose
//! filter matches; reading an object hands out the newest frame and clears
//! its new-data flag. A frame that arrives before the previous one was read
//! overwrites it, as on hardware message RAM.

use core::fmt;

use heapless::Vec;

use super::{CanFrame, FrameKind, ObjectSlot, StandardId};

/// Direction an object is configured for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Outbound data or remote frames.
    Transmit,
    /// Inbound data frames.
    Receive,
    /// Inbound remote frames (requests addressed to this node).
    RemoteRequest,
}

/// Static description of one message object.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ObjectDef {
    pub slot: ObjectSlot,
    pub id: StandardId,
    /// Bits of the identifier that must match; `0x7FF` is an exact match.
    pub mask: u16,
    pub direction: Direction,
}

impl ObjectDef {
    #[must_use]
    pub const fn new(slot: u8, id: StandardId, direction: Direction) -> Self {
        Self {
            slot: ObjectSlot::from_const(slot),
            id,
            mask: StandardId::MAX,
            direction,
        }
    }

    /// Returns `true` if this receive object accepts `frame`.
    #[must_use]
    pub fn accepts(&self, frame: &CanFrame) -> bool {
        let kind_matches = match self.direction {
            Direction::Transmit => false,
            Direction::Receive => frame.kind == FrameKind::Data,
            Direction::RemoteRequest => frame.kind == FrameKind::Remote,
        };
        kind_matches && (frame.id.raw() & self.mask) == (self.id.raw() & self.mask)
    }

    #[must_use]
    pub const fn is_receive(&self) -> bool {
        !matches!(self.direction, Direction::Transmit)
    }
}

/// Configuration errors for the bank.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MailboxError {
    Full,
    DuplicateSlot(u8),
}

impl fmt::Display for MailboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxError::Full => f.write_str("message object bank full"),
            MailboxError::DuplicateSlot(slot) => write!(f, "object slot {slot} already configured"),
        }
    }
}

struct Mailbox {
    def: ObjectDef,
    latest: Option<CanFrame>,
    new_data: bool,
}

/// Fixed-capacity set of message objects.
pub struct MailboxBank<const N: usize> {
    objects: Vec<Mailbox, N>,
    overruns: u32,
}

impl<const N: usize> MailboxBank<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            objects: Vec::new(),
            overruns: 0,
        }
    }

    /// Builds a bank from a static object table.
    ///
    /// # Errors
    /// Fails when the table does not fit or repeats a slot.
    pub fn from_table(table: &[ObjectDef]) -> Result<Self, MailboxError> {
        let mut bank = Self::new();
        for def in table {
            bank.configure(*def)?;
        }
        Ok(bank)
    }

    /// Adds one object.
    ///
    /// # Errors
    /// Fails when the bank is full or the slot is taken.
    pub fn configure(&mut self, def: ObjectDef) -> Result<(), MailboxError> {
        if self.objects.iter().any(|object| object.def.slot == def.slot) {
            return Err(MailboxError::DuplicateSlot(def.slot.raw()));
        }
        self.objects
            .push(Mailbox {
                def,
                latest: None,
                new_data: false,
            })
            .map_err(|_| MailboxError::Full)
    }

    /// Latches `frame` into every matching receive object. Returns how many
    /// objects accepted it.
    pub fn deliver(&mut self, frame: &CanFrame) -> usize {
        let mut accepted = 0;
        for object in &mut self.objects {
            if !object.def.accepts(frame) {
                continue;
            }
            if object.new_data {
                self.overruns = self.overruns.wrapping_add(1);
            }
            object.latest = Some(frame.clone());
            object.new_data = true;
            accepted += 1;
        }
        accepted
    }

    /// Takes the unread frame in `slot`, clearing new-data.
    pub fn take(&mut self, slot: ObjectSlot) -> Option<CanFrame> {
        let object = self.objects.iter_mut().find(|object| object.def.slot == slot)?;
        if !object.new_data {
            return None;
        }
        object.new_data = false;
        object.latest.clone()
    }

    /// Returns `true` if `slot` holds an unread frame.
    #[must_use]
    pub fn has_new_data(&self, slot: ObjectSlot) -> bool {
        self.objects
            .iter()
            .any(|object| object.def.slot == slot && object.new_data)
    }

    /// Frames overwritten before they were read.
    #[must_use]
    pub const fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Configured objects.
    pub fn objects(&self) -> impl Iterator<Item = &ObjectDef> {
        self.objects.iter().map(|object| &object.def)
    }
}

impl<const N: usize> Default for MailboxBank<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMP: StandardId = StandardId::from_const(0x102);
    const VOLT: StandardId = StandardId::from_const(0x104);

    fn bank() -> MailboxBank<4> {
        MailboxBank::from_table(&[
            ObjectDef::new(2, TEMP, Direction::Receive),
            ObjectDef::new(4, VOLT, Direction::RemoteRequest),
            ObjectDef::new(5, VOLT, Direction::Transmit),
        ])
        .unwrap()
    }

    #[test]
    fn frames_latch_into_matching_objects_only() {
        let mut bank = bank();
        let frame = CanFrame::data(TEMP, &[30]).unwrap();

        assert_eq!(bank.deliver(&frame), 1);
        let slot = ObjectSlot::from_const(2);
        assert!(bank.has_new_data(slot));
        assert_eq!(bank.take(slot), Some(frame));
        assert_eq!(bank.take(slot), None);
    }

    #[test]
    fn remote_requests_need_a_remote_object() {
        let mut bank = bank();
        assert_eq!(bank.deliver(&CanFrame::remote(VOLT)), 1);
        assert_eq!(bank.deliver(&CanFrame::data(VOLT, &[3]).unwrap()), 0);
        assert!(bank.take(ObjectSlot::from_const(4)).unwrap().is_remote());
    }

    #[test]
    fn unread_frames_are_overwritten() {
        let mut bank = bank();
        bank.deliver(&CanFrame::data(TEMP, &[20]).unwrap());
        bank.deliver(&CanFrame::data(TEMP, &[21]).unwrap());

        assert_eq!(bank.overruns(), 1);
        let frame = bank.take(ObjectSlot::from_const(2)).unwrap();
        assert_eq!(frame.first_byte(), Some(21));
    }

    #[test]
    fn duplicate_slots_are_rejected() {
        let mut bank = bank();
        let err = bank
            .configure(ObjectDef::new(2, VOLT, Direction::Receive))
            .unwrap_err();
        assert_eq!(err, MailboxError::DuplicateSlot(2));
    }
}
