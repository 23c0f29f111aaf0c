//! Queue-backed CAN bus adapter.
//!
//! The FDCAN task latches inbound frames into a shared [`MailboxBank`] and
//! drains the outbound queue; the node sees a [`QueuedBus`] that polls the
//! bank per object slot and queues frames without blocking.

use core::cell::RefCell;

use ecu_core::can::mailbox::{MailboxBank, MailboxError, ObjectDef};
use ecu_core::can::{BusError, CanBus, CanFrame, FrameKind, ObjectSlot, StandardId};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::{Channel, Receiver};
use embedded_can::{Frame, Id};

use super::BoardMutex;

/// Message objects available to one node.
pub const MAILBOX_OBJECTS: usize = 8;

/// Frames waiting for the controller.
pub const TX_QUEUE_DEPTH: usize = 8;

/// Controller bit rate.
pub const CAN_BITRATE: u32 = 500_000;

pub type OutboundReceiver<'a> = Receiver<'a, BoardMutex, CanFrame, TX_QUEUE_DEPTH>;

/// State shared between the FDCAN task and the node.
pub struct CanLink {
    mailboxes: Mutex<BoardMutex, RefCell<MailboxBank<MAILBOX_OBJECTS>>>,
    outbound: Channel<BoardMutex, CanFrame, TX_QUEUE_DEPTH>,
}

impl CanLink {
    pub const fn new() -> Self {
        Self {
            mailboxes: Mutex::new(RefCell::new(MailboxBank::new())),
            outbound: Channel::new(),
        }
    }

    /// Loads the node's object table.
    pub fn configure(&self, table: &[ObjectDef]) -> Result<(), MailboxError> {
        self.mailboxes.lock(|bank| {
            let mut bank = bank.borrow_mut();
            table.iter().try_for_each(|def| bank.configure(*def))
        })
    }

    /// Latches an inbound frame; returns how many objects accepted it.
    pub fn deliver(&self, frame: &CanFrame) -> usize {
        self.mailboxes.lock(|bank| bank.borrow_mut().deliver(frame))
    }

    /// Frames lost because an object was overwritten before it was read.
    pub fn overruns(&self) -> u32 {
        self.mailboxes.lock(|bank| bank.borrow().overruns())
    }

    pub fn outbound(&self) -> OutboundReceiver<'_> {
        self.outbound.receiver()
    }

    /// Node-side handle, initially disabled.
    pub fn bus(&self) -> QueuedBus<'_> {
        QueuedBus {
            link: self,
            enabled: false,
        }
    }
}

impl Default for CanLink {
    fn default() -> Self {
        Self::new()
    }
}

/// [`CanBus`] implementation over a [`CanLink`].
pub struct QueuedBus<'a> {
    link: &'a CanLink,
    enabled: bool,
}

impl CanBus for QueuedBus<'_> {
    type Error = BusError;

    fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        if !self.enabled {
            return Err(BusError::Disabled);
        }
        self.link
            .outbound
            .try_send(frame.clone())
            .map_err(|_| BusError::QueueFull)
    }

    fn receive(&mut self, slot: ObjectSlot) -> Option<CanFrame> {
        self.link.mailboxes.lock(|bank| bank.borrow_mut().take(slot))
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Converts a frame into the controller's frame type.
pub fn to_wire<F: Frame>(frame: &CanFrame) -> Option<F> {
    let id = embedded_can::StandardId::new(frame.id.raw())?;
    match frame.kind {
        FrameKind::Data => F::new(id, frame.payload()),
        FrameKind::Remote => F::new_remote(id, 0),
    }
}

/// Converts a received controller frame. Extended identifiers are not part
/// of the protocol and yield `None`.
pub fn from_wire<F: Frame>(frame: &F) -> Option<CanFrame> {
    let Id::Standard(raw) = frame.id() else {
        return None;
    };
    let id = StandardId::new(raw.as_raw())?;
    if frame.is_remote_frame() {
        Some(CanFrame::remote(id))
    } else {
        CanFrame::data(id, frame.data()).ok()
    }
}
