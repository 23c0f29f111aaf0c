//! Node event log shared by firmware and host targets.
//!
//! Nodes record notable transitions (counter movement, latches, state
//! broadcasts, CAN gating, communication episodes, tester sessions and
//! collaborator failures) into a fixed-capacity ring with tick timestamps.
//! The firmware mirrors new entries to defmt and the emulator prints them, so
//! both read the same history through [`EventLog::newer_than`].

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::dtc::{DtcCode, FaultCounter};
use crate::state::SystemState;
use crate::storage::NvCell;
use crate::ticks::Tick;

/// Entries retained per node.
pub const EVENT_LOG_CAPACITY: usize = 64;

/// Monotonic (wrapping) identifier assigned to each record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EventId(u32);

impl EventId {
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// `true` if `self` was recorded after `other`, tolerating wraparound.
    #[must_use]
    pub const fn is_after(self, other: EventId) -> bool {
        let delta = self.0.wrapping_sub(other.0);
        delta != 0 && delta < (1 << 31)
    }
}

/// Notable node transitions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeEvent {
    Boot(DtcCode),
    CounterIncremented { counter: FaultCounter, reached: u32 },
    DtcLatched(DtcCode),
    DtcCleared,
    StateBroadcast(SystemState),
    StateReceived(SystemState),
    CanEnabled(bool),
    CommLost,
    CommRestored,
    VoltageQueried,
    VoltageReported(u8),
    TemperatureReported(u8),
    GpioCommand(u8),
    FaultReminder(bool),
    TesterEntered,
    TesterExited,
    TransmitFailed(u16),
    StorageFailed(NvCell),
}

impl NodeEvent {
    /// Short stable tag for log sinks without `core::fmt`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            NodeEvent::Boot(_) => "boot",
            NodeEvent::CounterIncremented { .. } => "counter",
            NodeEvent::DtcLatched(_) => "dtc-latched",
            NodeEvent::DtcCleared => "dtc-cleared",
            NodeEvent::StateBroadcast(_) => "state-tx",
            NodeEvent::StateReceived(_) => "state-rx",
            NodeEvent::CanEnabled(_) => "can-enabled",
            NodeEvent::CommLost => "comm-lost",
            NodeEvent::CommRestored => "comm-restored",
            NodeEvent::VoltageQueried => "voltage-query",
            NodeEvent::VoltageReported(_) => "voltage",
            NodeEvent::TemperatureReported(_) => "temperature",
            NodeEvent::GpioCommand(_) => "gpio",
            NodeEvent::FaultReminder(_) => "fault-reminder",
            NodeEvent::TesterEntered => "tester-enter",
            NodeEvent::TesterExited => "tester-exit",
            NodeEvent::TransmitFailed(_) => "tx-failed",
            NodeEvent::StorageFailed(_) => "storage-failed",
        }
    }

    /// Numeric detail attached to the event, `0` when there is none.
    #[must_use]
    pub const fn detail(self) -> u32 {
        match self {
            NodeEvent::Boot(code) | NodeEvent::DtcLatched(code) => code.value(),
            NodeEvent::CounterIncremented { reached, .. } => reached,
            NodeEvent::StateBroadcast(state) | NodeEvent::StateReceived(state) => {
                state.code() as u32
            }
            NodeEvent::CanEnabled(flag) | NodeEvent::FaultReminder(flag) => flag as u32,
            NodeEvent::VoltageReported(value)
            | NodeEvent::TemperatureReported(value)
            | NodeEvent::GpioCommand(value) => value as u32,
            NodeEvent::TransmitFailed(id) => id as u32,
            NodeEvent::StorageFailed(cell) => cell.address(),
            NodeEvent::DtcCleared
            | NodeEvent::CommLost
            | NodeEvent::CommRestored
            | NodeEvent::VoltageQueried
            | NodeEvent::TesterEntered
            | NodeEvent::TesterExited => 0,
        }
    }
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEvent::Boot(code) => write!(f, "boot dtc={code}"),
            NodeEvent::CounterIncremented { counter, reached } => {
                write!(f, "counter {counter:?} reached {reached}")
            }
            NodeEvent::DtcLatched(code) => write!(f, "dtc latched {code}"),
            NodeEvent::StateBroadcast(state) => write!(f, "state broadcast {state}"),
            NodeEvent::StateReceived(state) => write!(f, "state received {state}"),
            NodeEvent::CanEnabled(enabled) => {
                f.write_str(if *enabled { "can enabled" } else { "can disabled" })
            }
            NodeEvent::VoltageReported(value) => write!(f, "voltage {value}V"),
            NodeEvent::TemperatureReported(value) => write!(f, "temperature {value}C"),
            NodeEvent::GpioCommand(value) => write!(f, "gpio command {value:#04x}"),
            NodeEvent::FaultReminder(set) => write!(f, "fault reminder {}", u8::from(*set)),
            NodeEvent::TransmitFailed(id) => write!(f, "tx failed id={id:#05x}"),
            NodeEvent::StorageFailed(cell) => write!(f, "storage failed {cell}"),
            other => f.write_str(other.label()),
        }
    }
}

/// One timestamped log entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EventRecord {
    pub id: EventId,
    pub tick: Tick,
    pub event: NodeEvent,
}

/// Fixed-capacity ring of node events.
pub struct EventLog<const CAPACITY: usize = EVENT_LOG_CAPACITY> {
    ring: HistoryBuf<EventRecord, CAPACITY>,
    next_id: u32,
}

impl<const CAPACITY: usize> EventLog<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_id: 0,
        }
    }

    /// Appends an event, evicting the oldest entry when full.
    pub fn record(&mut self, tick: Tick, event: NodeEvent) -> EventId {
        let id = EventId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.ring.write(EventRecord { id, tick, event });
        id
    }

    /// Entries in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, EventRecord> {
        self.ring.oldest_ordered()
    }

    /// Entries recorded after `last`, oldest first. `None` yields everything.
    pub fn newer_than(&self, last: Option<EventId>) -> impl Iterator<Item = &EventRecord> {
        self.ring
            .oldest_ordered()
            .filter(move |record| last.is_none_or(|seen| record.id.is_after(seen)))
    }

    /// Most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&EventRecord> {
        self.ring.recent()
    }

    /// Returns `true` if any retained entry matches `predicate`.
    pub fn contains(&self, mut predicate: impl FnMut(&NodeEvent) -> bool) -> bool {
        self.ring.oldest_ordered().any(|record| predicate(&record.event))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<const CAPACITY: usize> Default for EventLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_numbered_and_ordered() {
        let mut log: EventLog<4> = EventLog::new();
        let first = log.record(10, NodeEvent::CommLost);
        let second = log.record(20, NodeEvent::CommRestored);

        assert!(second.is_after(first));
        assert_eq!(log.latest().map(|record| record.tick), Some(20));
        let ticks: heapless::Vec<Tick, 4> = log.oldest_first().map(|record| record.tick).collect();
        assert_eq!(ticks.as_slice(), &[10, 20]);
    }

    #[test]
    fn newer_than_skips_seen_entries() {
        let mut log: EventLog<4> = EventLog::new();
        let seen = log.record(1, NodeEvent::TesterEntered);
        log.record(2, NodeEvent::DtcCleared);
        log.record(3, NodeEvent::TesterExited);

        let unseen: heapless::Vec<Tick, 4> = log.newer_than(Some(seen)).map(|record| record.tick).collect();
        assert_eq!(unseen.as_slice(), &[2, 3]);
        assert_eq!(log.newer_than(None).count(), 3);
    }

    #[test]
    fn ring_evicts_oldest() {
        let mut log: EventLog<2> = EventLog::new();
        for tick in 0..5 {
            log.record(tick, NodeEvent::VoltageQueried);
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.oldest_first().next().map(|record| record.tick), Some(3));
    }

    #[test]
    fn ids_survive_wraparound() {
        assert!(EventId(1).is_after(EventId(u32::MAX)));
        assert!(!EventId(5).is_after(EventId(5)));
    }
}
