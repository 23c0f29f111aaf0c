//! Fault cells persisted in an append-only log over two flash pages.
//!
//! Every slot is 8 bytes (the G0 programming granularity). Slot 0 of a page
//! is its header: a magic word and a sequence number. The remaining slots are
//! records, each carrying one cell's new value, appended in write order; the
//! last record for a cell wins when the page is replayed at boot.
//!
//! When the active page is full, the current values are copied to the other
//! page, its header is written last, and only then is the old page erased. A
//! reset at any point leaves at least one page with a valid header and a
//! complete set of values.

use ecu_core::storage::{CELL_COUNT, ERASED, NvCell, NvStorage};

/// Bytes per slot.
pub const SLOT_BYTES: usize = 8;
/// Erase granularity.
pub const PAGE_BYTES: u32 = 2048;
/// Slots per page, header included.
#[allow(clippy::cast_possible_truncation)]
pub const SLOTS_PER_PAGE: usize = PAGE_BYTES as usize / SLOT_BYTES;

const HEADER_MAGIC: u32 = 0x4543_5546;
const RECORD_TAIL: [u8; 2] = [0x00, 0x00];

/// One programmable unit.
pub type Slot = [u8; SLOT_BYTES];

const ERASED_SLOT: Slot = [0xFF; SLOT_BYTES];

/// The pair of pages the log alternates between, addressed by slot.
pub trait PageFlash {
    type Error: core::fmt::Debug;

    fn read_slot(&mut self, page: usize, slot: usize) -> Result<Slot, Self::Error>;
    fn write_slot(&mut self, page: usize, slot: usize, bytes: &Slot) -> Result<(), Self::Error>;
    fn erase_page(&mut self, page: usize) -> Result<(), Self::Error>;
}

/// RAM copy of the persisted cells.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageImage {
    cells: [u32; CELL_COUNT],
}

impl PageImage {
    #[must_use]
    pub const fn erased() -> Self {
        Self {
            cells: [ERASED; CELL_COUNT],
        }
    }

    #[must_use]
    pub const fn get(&self, cell: NvCell) -> u32 {
        self.cells[cell.slot()]
    }

    /// Updates `cell`; returns `false` when the value was already stored.
    pub fn set(&mut self, cell: NvCell, value: u32) -> bool {
        let slot = &mut self.cells[cell.slot()];
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }
}

impl Default for PageImage {
    fn default() -> Self {
        Self::erased()
    }
}

fn header(sequence: u32) -> Slot {
    let mut bytes = [0u8; SLOT_BYTES];
    bytes[..4].copy_from_slice(&HEADER_MAGIC.to_le_bytes());
    bytes[4..].copy_from_slice(&sequence.to_le_bytes());
    bytes
}

fn parse_header(bytes: &Slot) -> Option<u32> {
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    (magic == HEADER_MAGIC).then(|| u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]))
}

#[allow(clippy::cast_possible_truncation)]
fn record(cell: NvCell, value: u32) -> Slot {
    let index = cell.slot() as u8;
    let mut bytes = [0u8; SLOT_BYTES];
    bytes[..4].copy_from_slice(&value.to_le_bytes());
    bytes[4] = index;
    bytes[5] = !index;
    bytes[6..].copy_from_slice(&RECORD_TAIL);
    bytes
}

fn parse_record(bytes: &Slot) -> Option<(NvCell, u32)> {
    if bytes[5] != !bytes[4] || bytes[6..] != RECORD_TAIL {
        return None;
    }
    let cell = *NvCell::ALL.get(usize::from(bytes[4]))?;
    Some((cell, u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])))
}

/// `true` when `a` was stamped after `b`, across sequence wraparound.
#[allow(clippy::cast_possible_wrap)]
const fn newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct ActivePage {
    page: usize,
    sequence: u32,
    next: usize,
}

/// Cell storage on a [`PageFlash`] pair.
pub struct SlotLog<F> {
    flash: F,
    image: PageImage,
    active: Option<ActivePage>,
}

impl<F: PageFlash> SlotLog<F> {
    /// Picks the newest page with a valid header and replays its records.
    ///
    /// # Errors
    /// Fails when a slot cannot be read.
    pub fn mount(mut flash: F) -> Result<Self, F::Error> {
        let mut current: Option<(usize, u32)> = None;
        for page in 0..2 {
            let Some(sequence) = parse_header(&flash.read_slot(page, 0)?) else {
                continue;
            };
            if current.is_none_or(|(_, best)| newer(sequence, best)) {
                current = Some((page, sequence));
            }
        }

        let mut image = PageImage::erased();
        let active = match current {
            Some((page, sequence)) => {
                let mut next = 1;
                while next < SLOTS_PER_PAGE {
                    let bytes = flash.read_slot(page, next)?;
                    if bytes == ERASED_SLOT {
                        break;
                    }
                    // A torn record is skipped; its slot stays consumed.
                    if let Some((cell, value)) = parse_record(&bytes) {
                        image.set(cell, value);
                    }
                    next += 1;
                }
                Some(ActivePage {
                    page,
                    sequence,
                    next,
                })
            }
            None => None,
        };

        Ok(Self {
            flash,
            image,
            active,
        })
    }

    /// Copies the current values to the inactive page and switches to it.
    fn compact(&mut self) -> Result<(), F::Error> {
        let (target, sequence) = match self.active {
            Some(active) => (1 - active.page, active.sequence.wrapping_add(1)),
            None => (0, 1),
        };

        self.flash.erase_page(target)?;
        let mut next = 1;
        for cell in NvCell::ALL {
            let value = self.image.get(cell);
            if value != ERASED {
                self.flash.write_slot(target, next, &record(cell, value))?;
                next += 1;
            }
        }
        self.flash.write_slot(target, 0, &header(sequence))?;

        if let Some(previous) = self.active {
            self.flash.erase_page(previous.page)?;
        }
        self.active = Some(ActivePage {
            page: target,
            sequence,
            next,
        });
        Ok(())
    }

    #[cfg(test)]
    fn flash(&self) -> &F {
        &self.flash
    }
}

impl<F: PageFlash> NvStorage for SlotLog<F> {
    type Error = F::Error;

    fn read(&mut self, cell: NvCell) -> Result<u32, Self::Error> {
        Ok(self.image.get(cell))
    }

    fn write(&mut self, cell: NvCell, value: u32) -> Result<(), Self::Error> {
        if !self.image.set(cell, value) {
            return Ok(());
        }
        match self.active {
            Some(ref mut active) if active.next < SLOTS_PER_PAGE => {
                let slot = active.next;
                active.next += 1;
                let page = active.page;
                self.flash.write_slot(page, slot, &record(cell, value))
            }
            // The compacted copy already carries the new value.
            _ => self.compact(),
        }
    }
}

#[cfg(target_os = "none")]
pub use self::device::FlashStorage;

#[cfg(target_os = "none")]
mod device {
    use embassy_stm32::flash::{Blocking, Error, FLASH_SIZE, Flash};

    use super::{PAGE_BYTES, PageFlash, SLOT_BYTES, Slot, SlotLog};

    /// The last two pages of flash hold the log.
    #[allow(clippy::cast_possible_truncation)]
    const LOG_OFFSET: u32 = FLASH_SIZE as u32 - 2 * PAGE_BYTES;

    /// Blocking flash access. Erase and program wait on the controller's busy
    /// flag; the independent watchdog resets the board if one never finishes.
    pub struct PagePair {
        flash: Flash<'static, Blocking>,
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn slot_offset(page: usize, slot: usize) -> u32 {
        LOG_OFFSET + page as u32 * PAGE_BYTES + (slot * SLOT_BYTES) as u32
    }

    impl PageFlash for PagePair {
        type Error = Error;

        fn read_slot(&mut self, page: usize, slot: usize) -> Result<Slot, Self::Error> {
            let mut bytes = [0u8; SLOT_BYTES];
            self.flash.blocking_read(slot_offset(page, slot), &mut bytes)?;
            Ok(bytes)
        }

        fn write_slot(&mut self, page: usize, slot: usize, bytes: &Slot) -> Result<(), Self::Error> {
            self.flash.blocking_write(slot_offset(page, slot), bytes)
        }

        fn erase_page(&mut self, page: usize) -> Result<(), Self::Error> {
            let start = slot_offset(page, 0);
            self.flash.blocking_erase(start, start + PAGE_BYTES)
        }
    }

    pub type FlashStorage = SlotLog<PagePair>;

    impl FlashStorage {
        /// Mounts the log kept in the last two pages.
        pub fn new(flash: Flash<'static, Blocking>) -> Result<Self, Error> {
            Self::mount(PagePair { flash })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Eq, PartialEq)]
    struct PowerCut;

    /// Two RAM pages. Operations fail once `budget` runs out, as if power was
    /// lost before they could run.
    #[derive(Clone)]
    struct RamPages {
        pages: [[Slot; SLOTS_PER_PAGE]; 2],
        budget: Option<usize>,
        erases: usize,
    }

    impl RamPages {
        fn blank() -> Self {
            Self {
                pages: [[ERASED_SLOT; SLOTS_PER_PAGE]; 2],
                budget: None,
                erases: 0,
            }
        }

        fn spend(&mut self) -> Result<(), PowerCut> {
            match &mut self.budget {
                Some(0) => Err(PowerCut),
                Some(left) => {
                    *left -= 1;
                    Ok(())
                }
                None => Ok(()),
            }
        }

        fn restored(&self) -> Self {
            Self {
                budget: None,
                ..self.clone()
            }
        }
    }

    impl PageFlash for RamPages {
        type Error = PowerCut;

        fn read_slot(&mut self, page: usize, slot: usize) -> Result<Slot, PowerCut> {
            Ok(self.pages[page][slot])
        }

        fn write_slot(&mut self, page: usize, slot: usize, bytes: &Slot) -> Result<(), PowerCut> {
            self.spend()?;
            let target = &mut self.pages[page][slot];
            assert_eq!(*target, ERASED_SLOT, "slot programmed twice");
            *target = *bytes;
            Ok(())
        }

        fn erase_page(&mut self, page: usize) -> Result<(), PowerCut> {
            self.spend()?;
            self.pages[page] = [ERASED_SLOT; SLOTS_PER_PAGE];
            self.erases += 1;
            Ok(())
        }
    }

    fn remount(log: &SlotLog<RamPages>) -> SlotLog<RamPages> {
        SlotLog::mount(log.flash().restored()).unwrap()
    }

    #[test]
    fn blank_flash_reads_as_erased_cells() {
        let mut log = SlotLog::mount(RamPages::blank()).unwrap();
        assert_eq!(log.read(NvCell::Dtc).unwrap(), ERASED);
        assert_eq!(log.image, PageImage::erased());
    }

    #[test]
    fn latest_record_wins_after_remount() {
        let mut log = SlotLog::mount(RamPages::blank()).unwrap();
        log.write(NvCell::CommCounter, 1).unwrap();
        log.write(NvCell::CommCounter, 2).unwrap();
        log.write(NvCell::Dtc, 3).unwrap();
        log.write(NvCell::Dtc, 3).unwrap();

        let mut mounted = remount(&log);
        assert_eq!(mounted.read(NvCell::CommCounter).unwrap(), 2);
        assert_eq!(mounted.read(NvCell::Dtc).unwrap(), 3);
        assert_eq!(mounted.read(NvCell::OverheatCounter).unwrap(), ERASED);
        // One erase to start the log; appends never erase.
        assert_eq!(log.flash().erases, 1);
    }

    #[test]
    fn full_page_moves_to_the_other_page() {
        let mut log = SlotLog::mount(RamPages::blank()).unwrap();
        log.write(NvCell::Dtc, 3).unwrap();
        let mut value = 0;
        while log.active.is_some_and(|active| active.page == 0) {
            value += 1;
            log.write(NvCell::CommCounter, value).unwrap();
        }

        let mut mounted = remount(&log);
        assert_eq!(mounted.active.map(|active| active.page), Some(1));
        assert_eq!(mounted.read(NvCell::Dtc).unwrap(), 3);
        assert_eq!(mounted.read(NvCell::CommCounter).unwrap(), value);
        assert_eq!(log.flash().pages[0][0], ERASED_SLOT);
    }

    #[test]
    fn power_cut_during_compaction_keeps_the_previous_values() {
        let mut log = SlotLog::mount(RamPages::blank()).unwrap();
        log.write(NvCell::Dtc, 3).unwrap();
        log.write(NvCell::OverheatCounter, 2).unwrap();
        let mut presses = 0;
        while log.active.is_some_and(|active| active.next < SLOTS_PER_PAGE) {
            presses ^= 1;
            log.write(NvCell::ButtonCounter, presses).unwrap();
        }
        let settled = log.image.get(NvCell::ButtonCounter);

        // Cut power at every step of the move: erase, copies, header, old erase.
        for budget in 0..=CELL_COUNT + 2 {
            let mut flash = log.flash().restored();
            flash.budget = Some(budget);
            let mut attempt = SlotLog::mount(flash).unwrap();
            let outcome = attempt.write(NvCell::CommCounter, 1);

            let mut mounted = remount(&attempt);
            assert_eq!(mounted.read(NvCell::Dtc).unwrap(), 3, "budget {budget}");
            assert_eq!(mounted.read(NvCell::OverheatCounter).unwrap(), 2, "budget {budget}");
            assert_eq!(mounted.read(NvCell::ButtonCounter).unwrap(), settled, "budget {budget}");
            let comm = mounted.read(NvCell::CommCounter).unwrap();
            if outcome.is_ok() {
                assert_eq!(comm, 1, "budget {budget}");
            } else {
                assert!(comm == ERASED || comm == 1, "budget {budget}");
            }
        }
    }

    #[test]
    fn torn_record_is_skipped() {
        let mut log = SlotLog::mount(RamPages::blank()).unwrap();
        log.write(NvCell::Dtc, 1).unwrap();
        let mut flash = log.flash().restored();
        let next = log.active.map_or(0, |active| active.next);
        flash.pages[0][next] = [0x02, 0x00, 0x00, 0x00, 0x01, 0xFF, 0xFF, 0xFF];
        flash.pages[0][next + 1] = record(NvCell::CommCounter, 4);

        let mut mounted = SlotLog::mount(flash).unwrap();
        assert_eq!(mounted.read(NvCell::Dtc).unwrap(), 1);
        assert_eq!(mounted.read(NvCell::CommCounter).unwrap(), 4);
        assert_eq!(mounted.active.map(|active| active.next), Some(next + 2));
    }

    #[test]
    fn newest_header_wins_across_wraparound() {
        assert!(newer(1, u32::MAX));
        assert!(newer(5, 4));
        assert!(!newer(4, 5));
    }
}
