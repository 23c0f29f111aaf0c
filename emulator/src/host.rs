//! Host collaborators for the emulated boards.
//!
//! Each board gets a [`VirtualBus`] whose outbox the session carries across
//! the virtual wire, a [`FileStorage`] that optionally mirrors its cells to a
//! text file, and in-memory LEDs, UART and inputs the console drives.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;

use ecu_core::can::mailbox::{MailboxBank, MailboxError, ObjectDef};
use ecu_core::can::{BusError, CanBus, CanFrame, ObjectSlot};
use ecu_core::inputs::{Buttons, Sensors};
use ecu_core::node::Platform;
use ecu_core::presentation::{Console, Indicators, Led, LedState};
use ecu_core::storage::{CELL_COUNT, ERASED, NvCell, NvStorage};
use winnow::ascii::{hex_uint, space1};
use winnow::combinator::preceded;
use winnow::prelude::*;

/// Message objects per emulated controller, matching the MCU's bank.
pub const MAILBOX_OBJECTS: usize = 8;

pub struct HostPlatform;

impl Platform for HostPlatform {
    type Storage = FileStorage;
    type Bus = VirtualBus;
    type Indicators = HostLeds;
    type Console = HostConsole;
    type Inputs = HostInputs;
}

/// One board's CAN controller. Transmitted frames wait in the outbox until
/// the session moves them to the other board.
pub struct VirtualBus {
    bank: MailboxBank<MAILBOX_OBJECTS>,
    outbox: Vec<CanFrame>,
    enabled: bool,
}

impl VirtualBus {
    /// # Errors
    /// Fails when `table` does not fit the mailbox bank.
    pub fn new(table: &[ObjectDef]) -> Result<Self, MailboxError> {
        Ok(Self {
            bank: MailboxBank::from_table(table)?,
            outbox: Vec::new(),
            enabled: false,
        })
    }

    /// Offers a frame from the wire to the receive objects.
    pub fn deliver(&mut self, frame: &CanFrame) -> usize {
        self.bank.deliver(frame)
    }

    pub fn take_outbox(&mut self) -> Vec<CanFrame> {
        std::mem::take(&mut self.outbox)
    }

    #[must_use]
    pub const fn overruns(&self) -> u32 {
        self.bank.overruns()
    }
}

impl CanBus for VirtualBus {
    type Error = BusError;

    fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        if !self.enabled {
            return Err(BusError::Disabled);
        }
        self.outbox.push(frame.clone());
        Ok(())
    }

    fn receive(&mut self, slot: ObjectSlot) -> Option<CanFrame> {
        self.bank.take(slot)
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Persisted cells, optionally backed by a text file.
///
/// The file holds one `address value` pair of hex numbers per line and is
/// rewritten whenever a cell changes.
pub struct FileStorage {
    cells: [u32; CELL_COUNT],
    path: Option<PathBuf>,
}

impl FileStorage {
    /// Erased storage that lives only as long as the session.
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            cells: [ERASED; CELL_COUNT],
            path: None,
        }
    }

    /// Loads the cells stored at `path`, starting erased if the file does
    /// not exist yet.
    ///
    /// # Errors
    /// Fails when the file cannot be read or holds an unknown cell.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let cells = match fs::read_to_string(&path) {
            Ok(text) => parse_image(&text)?,
            Err(error) if error.kind() == ErrorKind::NotFound => [ERASED; CELL_COUNT],
            Err(error) => return Err(error),
        };
        Ok(Self {
            cells,
            path: Some(path),
        })
    }

    fn flush(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut text = String::new();
        for cell in NvCell::ALL {
            text.push_str(&format!(
                "{:#05x} {:#010x}\n",
                cell.address(),
                self.cells[cell.slot()]
            ));
        }
        fs::write(path, text)
    }
}

impl NvStorage for FileStorage {
    type Error = io::Error;

    fn read(&mut self, cell: NvCell) -> Result<u32, Self::Error> {
        Ok(self.cells[cell.slot()])
    }

    fn write(&mut self, cell: NvCell, value: u32) -> Result<(), Self::Error> {
        if self.cells[cell.slot()] == value {
            return Ok(());
        }
        self.cells[cell.slot()] = value;
        self.flush()
    }
}

fn image_line(input: &mut &str) -> winnow::Result<(u32, u32)> {
    (
        preceded("0x", hex_uint),
        preceded((space1, "0x"), hex_uint),
    )
        .parse_next(input)
}

fn parse_image(text: &str) -> io::Result<[u32; CELL_COUNT]> {
    let mut cells = [ERASED; CELL_COUNT];
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid = || {
            io::Error::new(
                ErrorKind::InvalidData,
                format!("storage line {}: `{line}`", number + 1),
            )
        };
        let (address, value) = image_line.parse(line).map_err(|_| invalid())?;
        let cell = NvCell::from_address(address).ok_or_else(invalid)?;
        cells[cell.slot()] = value;
    }
    Ok(cells)
}

/// LED sink with no pins behind it; the session reads the panel instead.
#[derive(Default)]
pub struct HostLeds;

impl Indicators for HostLeds {
    fn set(&mut self, _led: Led, _state: LedState) {}
}

/// Diagnostic UART: typed keys in, text lines out.
#[derive(Default)]
pub struct HostConsole {
    output: String,
    input: VecDeque<u8>,
}

impl HostConsole {
    pub fn type_keys(&mut self, keys: &str) {
        self.input.extend(keys.bytes());
    }

    /// Completed output lines without their `\r\n`. A trailing partial line
    /// stays buffered.
    pub fn take_lines(&mut self) -> Vec<String> {
        let Some(end) = self.output.rfind('\n') else {
            return Vec::new();
        };
        let pending = self.output.split_off(end + 1);
        let complete = std::mem::replace(&mut self.output, pending);
        complete
            .lines()
            .map(|line| line.trim_end_matches('\r').to_owned())
            .collect()
    }
}

impl fmt::Write for HostConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.output.push_str(s);
        Ok(())
    }
}

impl Console for HostConsole {
    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }
}

/// Sensor readings (already scaled) and button levels.
pub struct HostInputs {
    pub temperature: u8,
    pub voltage: u8,
    pub left: bool,
    pub right: bool,
}

impl Default for HostInputs {
    fn default() -> Self {
        Self {
            temperature: 20,
            voltage: 3,
            left: false,
            right: false,
        }
    }
}

impl Sensors for HostInputs {
    fn read_temperature(&mut self) -> u8 {
        self.temperature
    }

    fn read_voltage(&mut self) -> u8 {
        self.voltage
    }
}

impl Buttons for HostInputs {
    fn left(&mut self) -> bool {
        self.left
    }

    fn right(&mut self) -> bool {
        self.right
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;
    use std::time::{SystemTime, UNIX_EPOCH};

    use ecu_core::can::protocol::{MASTER_OBJECTS, Message, SLAVE_OBJECTS};

    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!("ecu-emulator-{}-{nanos}-{name}", std::process::id()))
    }

    #[test]
    fn disabled_bus_refuses_to_transmit() {
        let mut bus = VirtualBus::new(&MASTER_OBJECTS).unwrap();
        assert_eq!(bus.send(&Message::KeepAlive.encode()), Err(BusError::Disabled));

        bus.set_enabled(true);
        bus.send(&Message::KeepAlive.encode()).unwrap();
        assert_eq!(bus.take_outbox(), vec![Message::KeepAlive.encode()]);
        assert!(bus.take_outbox().is_empty());
    }

    #[test]
    fn frames_from_the_peer_land_in_their_receive_object() {
        let mut master = VirtualBus::new(&MASTER_OBJECTS).unwrap();
        let mut slave = VirtualBus::new(&SLAVE_OBJECTS).unwrap();
        master.set_enabled(true);
        master.send(&Message::KeepAlive.encode()).unwrap();

        for frame in master.take_outbox() {
            assert_eq!(slave.deliver(&frame), 1);
        }
        let received = SLAVE_OBJECTS
            .iter()
            .filter(|object| object.is_receive())
            .find_map(|object| slave.receive(object.slot));
        assert_eq!(received, Some(Message::KeepAlive.encode()));
    }

    #[test]
    fn storage_file_survives_a_reopen() {
        let path = scratch_file("nv.txt");
        let mut storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.read(NvCell::Dtc).unwrap(), ERASED);

        storage.write(NvCell::Dtc, 3).unwrap();
        storage.write(NvCell::OverheatCounter, 1).unwrap();

        let mut reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.read(NvCell::Dtc).unwrap(), 3);
        assert_eq!(reopened.read(NvCell::OverheatCounter).unwrap(), 1);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn storage_file_with_unknown_cell_is_rejected() {
        let path = scratch_file("bad.txt");
        fs::write(&path, "0x123 0x00000001\n").unwrap();
        let error = FileStorage::open(&path).err().unwrap();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn console_hands_out_complete_lines_only() {
        let mut console = HostConsole::default();
        write!(console, "Current DTC: 1\r\nVolt").unwrap();
        assert_eq!(console.take_lines(), vec!["Current DTC: 1".to_owned()]);
        write!(console, "age ECU1: 3v\r\n").unwrap();
        assert_eq!(console.take_lines(), vec!["Voltage ECU1: 3v".to_owned()]);
        assert!(console.take_lines().is_empty());
    }
}
