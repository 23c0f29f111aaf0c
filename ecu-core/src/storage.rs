//! Persisted storage cells.
//!
//! Both nodes share one fixed layout of 32-bit cells. A cell that has never
//! been written reads back as [`ERASED`]; [`read_normalized`] turns that into
//! zero and writes the zero back so the sentinel is only ever seen once.

use core::convert::Infallible;
use core::fmt;

/// Value of a cell that has never been written.
pub const ERASED: u32 = 0xFFFF_FFFF;

/// Number of persisted cells.
pub const CELL_COUNT: usize = 5;

/// Persisted cells and their byte offsets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NvCell {
    /// Overheat confirmations since the last latch.
    OverheatCounter,
    /// Active diagnostic trouble code.
    Dtc,
    /// Manual fault-injection presses since the last latch.
    ButtonCounter,
    /// Communication-loss episodes since the last latch or clear.
    CommCounter,
    /// Set while the peer has reported a fault state.
    FaultReminder,
}

impl NvCell {
    /// Every cell, in layout order.
    pub const ALL: [NvCell; CELL_COUNT] = [
        NvCell::OverheatCounter,
        NvCell::Dtc,
        NvCell::ButtonCounter,
        NvCell::CommCounter,
        NvCell::FaultReminder,
    ];

    /// Byte offset of the cell.
    #[must_use]
    pub const fn address(self) -> u32 {
        match self {
            NvCell::OverheatCounter => 0x100,
            NvCell::Dtc => 0x200,
            NvCell::ButtonCounter => 0x300,
            NvCell::CommCounter => 0x400,
            NvCell::FaultReminder => 0x500,
        }
    }

    /// Dense index of the cell, suitable for array-backed storage.
    #[must_use]
    pub const fn slot(self) -> usize {
        match self {
            NvCell::OverheatCounter => 0,
            NvCell::Dtc => 1,
            NvCell::ButtonCounter => 2,
            NvCell::CommCounter => 3,
            NvCell::FaultReminder => 4,
        }
    }

    /// Looks a cell up by byte offset.
    #[must_use]
    pub fn from_address(address: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|cell| cell.address() == address)
    }
}

impl fmt::Display for NvCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NvCell::OverheatCounter => "overheat-counter",
            NvCell::Dtc => "dtc",
            NvCell::ButtonCounter => "button-counter",
            NvCell::CommCounter => "comm-counter",
            NvCell::FaultReminder => "fault-reminder",
        };
        write!(f, "{label}@{:#05x}", self.address())
    }
}

/// Word-addressed non-volatile storage.
///
/// Each `write` is assumed to land atomically; callers persist after every
/// mutation so state survives an uncontrolled reset.
pub trait NvStorage {
    type Error: fmt::Debug;

    /// Reads the raw value of `cell`.
    ///
    /// # Errors
    /// Returns the backend error when the medium cannot be read.
    fn read(&mut self, cell: NvCell) -> Result<u32, Self::Error>;

    /// Persists `value` into `cell`.
    ///
    /// # Errors
    /// Returns the backend error when the write does not complete.
    fn write(&mut self, cell: NvCell, value: u32) -> Result<(), Self::Error>;
}

/// Reads `cell`, replacing the erased sentinel with a persisted zero.
///
/// # Errors
/// Propagates storage read or write failures.
pub fn read_normalized<S: NvStorage + ?Sized>(
    storage: &mut S,
    cell: NvCell,
) -> Result<u32, S::Error> {
    let value = storage.read(cell)?;
    if value == ERASED {
        storage.write(cell, 0)?;
        return Ok(0);
    }
    Ok(value)
}

/// RAM-backed cells that start out erased.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RamStorage {
    cells: [u32; CELL_COUNT],
    writes: u32,
}

impl RamStorage {
    /// Creates storage in the factory-erased state.
    #[must_use]
    pub const fn erased() -> Self {
        Self {
            cells: [ERASED; CELL_COUNT],
            writes: 0,
        }
    }

    /// Creates storage from a previously captured image.
    #[must_use]
    pub const fn from_cells(cells: [u32; CELL_COUNT]) -> Self {
        Self { cells, writes: 0 }
    }

    /// Raw value of `cell` without normalisation.
    #[must_use]
    pub const fn peek(&self, cell: NvCell) -> u32 {
        self.cells[cell.slot()]
    }

    /// Raw image of every cell in layout order.
    #[must_use]
    pub const fn cells(&self) -> [u32; CELL_COUNT] {
        self.cells
    }

    /// Number of writes performed since creation.
    #[must_use]
    pub const fn write_count(&self) -> u32 {
        self.writes
    }
}

impl Default for RamStorage {
    fn default() -> Self {
        Self::erased()
    }
}

impl NvStorage for RamStorage {
    type Error = Infallible;

    fn read(&mut self, cell: NvCell) -> Result<u32, Self::Error> {
        Ok(self.cells[cell.slot()])
    }

    fn write(&mut self, cell: NvCell, value: u32) -> Result<(), Self::Error> {
        self.cells[cell.slot()] = value;
        self.writes = self.writes.wrapping_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erased_cell_normalises_to_persisted_zero() {
        let mut storage = RamStorage::erased();
        assert_eq!(storage.peek(NvCell::CommCounter), ERASED);

        let value = read_normalized(&mut storage, NvCell::CommCounter).unwrap();

        assert_eq!(value, 0);
        assert_eq!(storage.peek(NvCell::CommCounter), 0);
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn written_cell_is_returned_untouched() {
        let mut storage = RamStorage::erased();
        storage.write(NvCell::Dtc, 2).unwrap();

        assert_eq!(read_normalized(&mut storage, NvCell::Dtc).unwrap(), 2);
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn addresses_round_trip_through_lookup() {
        for cell in NvCell::ALL {
            assert_eq!(NvCell::from_address(cell.address()), Some(cell));
        }
        assert_eq!(NvCell::from_address(0x600), None);
    }
}
