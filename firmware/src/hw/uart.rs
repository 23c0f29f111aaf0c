//! Diagnostic UART console.
//!
//! The node formats text into [`UartConsole`], which cuts it into frames at
//! line ends and queues them for the console task without blocking. Bytes
//! received by the console task are queued one by one for
//! [`Console::read_byte`].

use core::fmt;
use core::mem;

use ecu_core::presentation::Console;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::Vec;

use super::BoardMutex;

/// Largest frame handed to the UART in one write.
pub const CONSOLE_FRAME_SIZE: usize = 64;
/// Outbound frames waiting for the UART.
pub const CONSOLE_QUEUE_DEPTH: usize = 8;
/// Received bytes waiting for the node.
pub const INPUT_QUEUE_DEPTH: usize = 32;

pub type ConsoleFrame = Vec<u8, CONSOLE_FRAME_SIZE>;

pub type FrameReceiver<'a> = Receiver<'a, BoardMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>;
pub type InputSender<'a> = Sender<'a, BoardMutex, u8, INPUT_QUEUE_DEPTH>;

/// Channels between the node and the console task.
pub struct ConsoleQueue {
    outbound: Channel<BoardMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>,
    inbound: Channel<BoardMutex, u8, INPUT_QUEUE_DEPTH>,
}

impl ConsoleQueue {
    pub const fn new() -> Self {
        Self {
            outbound: Channel::new(),
            inbound: Channel::new(),
        }
    }

    pub fn outbound_receiver(&self) -> FrameReceiver<'_> {
        self.outbound.receiver()
    }

    pub fn inbound_sender(&self) -> InputSender<'_> {
        self.inbound.sender()
    }

    /// Node-side console handle.
    pub fn console(&self) -> UartConsole<'_> {
        UartConsole {
            queue: self,
            pending: Vec::new(),
            dropped: 0,
        }
    }
}

impl Default for ConsoleQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Console`] implementation over a [`ConsoleQueue`].
pub struct UartConsole<'a> {
    queue: &'a ConsoleQueue,
    pending: ConsoleFrame,
    dropped: u32,
}

impl UartConsole<'_> {
    /// Frames discarded because the UART fell behind.
    pub const fn dropped(&self) -> u32 {
        self.dropped
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let frame = mem::take(&mut self.pending);
        if self.queue.outbound.try_send(frame).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
        }
    }
}

impl fmt::Write for UartConsole<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if self.pending.is_full() {
                self.flush();
            }
            // cannot fail: the frame was flushed when full
            let _ = self.pending.push(byte);
            if byte == b'\n' {
                self.flush();
            }
        }
        Ok(())
    }
}

impl Console for UartConsole<'_> {
    fn read_byte(&mut self) -> Option<u8> {
        self.queue.inbound.try_receive().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_core::presentation::print_line;

    #[test]
    fn lines_are_queued_as_frames() {
        let queue = ConsoleQueue::new();
        let mut console = queue.console();
        print_line(&mut console, format_args!("Current DTC: {}", 1));

        let frame = queue.outbound_receiver().try_receive().unwrap();
        assert_eq!(frame.as_slice(), b"Current DTC: 1\r\n");
    }

    #[test]
    fn long_lines_are_split_at_the_frame_size() {
        let queue = ConsoleQueue::new();
        let mut console = queue.console();
        let long = [b'x'; CONSOLE_FRAME_SIZE + 10];
        let text = core::str::from_utf8(&long).unwrap();
        print_line(&mut console, format_args!("{text}"));

        let receiver = queue.outbound_receiver();
        assert_eq!(receiver.try_receive().unwrap().len(), CONSOLE_FRAME_SIZE);
        assert_eq!(receiver.try_receive().unwrap().len(), 12);
    }

    #[test]
    fn overflow_drops_whole_frames() {
        let queue = ConsoleQueue::new();
        let mut console = queue.console();
        for _ in 0..=CONSOLE_QUEUE_DEPTH {
            print_line(&mut console, format_args!("Normal State"));
        }
        assert_eq!(console.dropped(), 1);
    }

    #[test]
    fn received_bytes_are_read_in_order() {
        let queue = ConsoleQueue::new();
        let sender = queue.inbound_sender();
        sender.try_send(b'1').unwrap();
        sender.try_send(b'6').unwrap();

        let mut console = queue.console();
        assert_eq!(console.read_byte(), Some(b'1'));
        assert_eq!(console.read_byte(), Some(b'6'));
        assert_eq!(console.read_byte(), None);
    }
}
