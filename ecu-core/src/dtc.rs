//! Fault counters and latched diagnostic trouble codes.
//!
//! Each fault category accumulates in a persisted counter; the third
//! occurrence latches a DTC, persists it and zeroes the counter. Sensor damage
//! skips the counter and latches on first sight. Only one DTC is active at a
//! time: a later latch overwrites an earlier one. Every mutation is written
//! through to storage before the call returns.

use core::fmt;

use crate::config::GateBounds;
use crate::presentation::{Console, print_line};
use crate::storage::{NvCell, NvStorage, read_normalized};
use crate::ticks::{Tick, TickCounters, TimerId};

/// Occurrences that promote a counter to a latched DTC.
pub const LATCH_THRESHOLD: u32 = 3;

/// Voltage class reported by the peer that confirms an overheat.
pub const OVERHEAT_CONFIRM_VOLTAGE: u8 = 3;

/// Latched diagnostic trouble code.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DtcCode {
    None,
    Overheat,
    SensorDamaged,
    CommunicationLost,
}

impl DtcCode {
    /// Persisted numeric value.
    #[must_use]
    pub const fn value(self) -> u32 {
        match self {
            DtcCode::None => 0,
            DtcCode::Overheat => 1,
            DtcCode::SensorDamaged => 2,
            DtcCode::CommunicationLost => 3,
        }
    }

    #[must_use]
    pub const fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(DtcCode::None),
            1 => Some(DtcCode::Overheat),
            2 => Some(DtcCode::SensorDamaged),
            3 => Some(DtcCode::CommunicationLost),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, DtcCode::None)
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DtcCode::None => "none",
            DtcCode::Overheat => "overheat",
            DtcCode::SensorDamaged => "sensor-damaged",
            DtcCode::CommunicationLost => "comm-lost",
        };
        write!(f, "{} ({label})", self.value())
    }
}

/// Counters that accumulate toward a latch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultCounter {
    Overheat,
    Communication,
    Button,
}

impl FaultCounter {
    /// Cell holding the counter.
    #[must_use]
    pub const fn cell(self) -> NvCell {
        match self {
            FaultCounter::Overheat => NvCell::OverheatCounter,
            FaultCounter::Communication => NvCell::CommCounter,
            FaultCounter::Button => NvCell::ButtonCounter,
        }
    }

    /// Code latched when the counter reaches [`LATCH_THRESHOLD`].
    #[must_use]
    pub const fn latches(self) -> DtcCode {
        match self {
            FaultCounter::Overheat | FaultCounter::Button => DtcCode::Overheat,
            FaultCounter::Communication => DtcCode::CommunicationLost,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            FaultCounter::Overheat => "overheat",
            FaultCounter::Communication => "communication",
            FaultCounter::Button => "button",
        }
    }
}

/// Result of one counter increment.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CounterUpdate {
    pub counter: FaultCounter,
    /// Occurrence number reached by this increment (1-based).
    pub reached: u32,
    /// Value left in storage after the call.
    pub persisted: u32,
    /// DTC latched by this increment, if the threshold was crossed.
    pub latched: Option<DtcCode>,
}

/// Outcome of evaluating a peer voltage report.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VoltageVerdict {
    /// The voltage confirms an overheat; the overheat counter moved.
    OverheatConfirmed(CounterUpdate),
    /// The sensor is damaged; DTC 2 is latched.
    SensorDamaged,
    /// Above the confirmation class; no action.
    Ignored,
}

/// What the overheat indicator should show this pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverheatIndication {
    /// Pending overheat, blink window still open.
    Blinking,
    /// Nothing pending.
    Idle,
    /// A latched fault or communication loss takes precedence.
    Suppressed,
}

/// Outbound CAN gating decision for this pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CanGate {
    /// No DTC active; transmission allowed.
    Open,
    /// DTC active, display pass counted but bound not reached.
    Counting(u16),
    /// Display bound reached; transmission must stay off.
    Closed,
}

/// Fault state owned by a node.
#[derive(Debug)]
pub struct DtcManager {
    active: DtcCode,
    overheat_pending: bool,
    display_passes: u16,
    bounds: GateBounds,
    blink_window: Tick,
}

impl DtcManager {
    #[must_use]
    pub const fn new(bounds: GateBounds, blink_window: Tick) -> Self {
        Self {
            active: DtcCode::None,
            overheat_pending: false,
            display_passes: 0,
            bounds,
            blink_window,
        }
    }

    /// Normalises every persisted cell and restores the active DTC.
    ///
    /// A stored DTC outside the known codes is treated as none and rewritten.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub fn init<S: NvStorage>(&mut self, storage: &mut S) -> Result<DtcCode, S::Error> {
        for cell in NvCell::ALL {
            read_normalized(storage, cell)?;
        }
        let raw = storage.read(NvCell::Dtc)?;
        self.active = match DtcCode::from_value(raw) {
            Some(code) => code,
            None => {
                storage.write(NvCell::Dtc, 0)?;
                DtcCode::None
            }
        };
        Ok(self.active)
    }

    /// Currently latched code.
    #[must_use]
    pub const fn active(&self) -> DtcCode {
        self.active
    }

    #[must_use]
    pub const fn is_latched(&self) -> bool {
        self.active.is_active()
    }

    /// Records one overheat confirmation.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub fn increment_overheat<S: NvStorage, C: Console + ?Sized>(
        &mut self,
        storage: &mut S,
        console: &mut C,
    ) -> Result<CounterUpdate, S::Error> {
        self.increment(FaultCounter::Overheat, storage, console)
    }

    /// Records one communication-loss episode.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub fn increment_communication<S: NvStorage, C: Console + ?Sized>(
        &mut self,
        storage: &mut S,
        console: &mut C,
    ) -> Result<CounterUpdate, S::Error> {
        self.increment(FaultCounter::Communication, storage, console)
    }

    /// Records one manual fault-injection press.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub fn increment_button<S: NvStorage, C: Console + ?Sized>(
        &mut self,
        storage: &mut S,
        console: &mut C,
    ) -> Result<CounterUpdate, S::Error> {
        self.increment(FaultCounter::Button, storage, console)
    }

    fn increment<S: NvStorage, C: Console + ?Sized>(
        &mut self,
        counter: FaultCounter,
        storage: &mut S,
        console: &mut C,
    ) -> Result<CounterUpdate, S::Error> {
        let cell = counter.cell();
        let reached = read_normalized(storage, cell)?.saturating_add(1);
        print_line(
            console,
            format_args!("Current {} counter: {reached}", counter.label()),
        );

        let mut persisted = reached;
        let mut latched = None;
        if reached >= LATCH_THRESHOLD {
            let code = counter.latches();
            self.latch(code, storage)?;
            print_line(console, format_args!("Current DTC: {}", code.value()));
            persisted = 0;
            latched = Some(code);
        }
        storage.write(cell, persisted)?;

        Ok(CounterUpdate {
            counter,
            reached,
            persisted,
            latched,
        })
    }

    /// Latches `code` immediately, overwriting any active code.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub fn latch<S: NvStorage>(&mut self, code: DtcCode, storage: &mut S) -> Result<(), S::Error> {
        storage.write(NvCell::Dtc, code.value())?;
        if self.active != code {
            self.display_passes = 0;
        }
        self.active = code;
        Ok(())
    }

    /// Evaluates a peer voltage report.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub fn check_voltage<S: NvStorage, C: Console + ?Sized>(
        &mut self,
        voltage: u8,
        storage: &mut S,
        console: &mut C,
    ) -> Result<VoltageVerdict, S::Error> {
        if voltage == OVERHEAT_CONFIRM_VOLTAGE {
            let update = self.increment_overheat(storage, console)?;
            self.overheat_pending = true;
            Ok(VoltageVerdict::OverheatConfirmed(update))
        } else if voltage < OVERHEAT_CONFIRM_VOLTAGE {
            self.latch(DtcCode::SensorDamaged, storage)?;
            Ok(VoltageVerdict::SensorDamaged)
        } else {
            Ok(VoltageVerdict::Ignored)
        }
    }

    /// Reads the persisted DTC and prints it.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub fn read_dtc<S: NvStorage, C: Console + ?Sized>(
        &self,
        storage: &mut S,
        console: &mut C,
    ) -> Result<u32, S::Error> {
        let value = read_normalized(storage, NvCell::Dtc)?;
        print_line(console, format_args!("Current DTC: {value}"));
        Ok(value)
    }

    /// Clears the DTC and the communication counter. The overheat counter is
    /// deliberately left as it is.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub fn clear_dtc<S: NvStorage, C: Console + ?Sized>(
        &mut self,
        storage: &mut S,
        console: &mut C,
    ) -> Result<(), S::Error> {
        self.active = DtcCode::None;
        self.display_passes = 0;
        storage.write(NvCell::Dtc, 0)?;
        print_line(console, format_args!("DTC Cleared Successfully"));
        storage.write(NvCell::CommCounter, 0)?;
        Ok(())
    }

    /// Clears a latched communication DTC without operator involvement.
    /// Other codes are left untouched. Returns `true` when a code was cleared.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub fn recover_communication<S: NvStorage>(&mut self, storage: &mut S) -> Result<bool, S::Error> {
        if self.active != DtcCode::CommunicationLost {
            return Ok(false);
        }
        self.active = DtcCode::None;
        self.display_passes = 0;
        storage.write(NvCell::Dtc, 0)?;
        storage.write(NvCell::CommCounter, 0)?;
        Ok(true)
    }

    /// Marks an overheat as pending so the indicator starts blinking.
    pub fn arm_overheat_blink(&mut self) {
        self.overheat_pending = true;
    }

    /// Drops a pending overheat indication.
    pub fn disarm_overheat_blink(&mut self) {
        self.overheat_pending = false;
    }

    #[must_use]
    pub const fn overheat_blink_armed(&self) -> bool {
        self.overheat_pending
    }

    /// Advances the overheat indicator using the blink timer.
    ///
    /// The blink timer is held at zero whenever nothing is blinking, so a new
    /// episode always gets the full window.
    pub fn supervise_overheat(
        &mut self,
        ticks: &TickCounters,
        comm_indication: bool,
    ) -> OverheatIndication {
        if self.is_latched() || comm_indication {
            ticks.reset(TimerId::Blink);
            return OverheatIndication::Suppressed;
        }
        if !self.overheat_pending {
            ticks.reset(TimerId::Blink);
            return OverheatIndication::Idle;
        }
        if ticks.expired(TimerId::Blink, self.blink_window) {
            self.overheat_pending = false;
            ticks.reset(TimerId::Blink);
            return OverheatIndication::Idle;
        }
        OverheatIndication::Blinking
    }

    /// Counts one display pass of the active DTC and decides whether outbound
    /// CAN stays enabled.
    pub fn gate_step(&mut self) -> CanGate {
        let bound = match self.active {
            DtcCode::None => {
                self.display_passes = 0;
                return CanGate::Open;
            }
            DtcCode::Overheat => self.bounds.overheat,
            DtcCode::SensorDamaged => self.bounds.voltage,
            DtcCode::CommunicationLost => self.bounds.communication,
        };
        self.display_passes = self.display_passes.saturating_add(1);
        if self.display_passes >= bound {
            CanGate::Closed
        } else {
            CanGate::Counting(self.display_passes)
        }
    }
}
