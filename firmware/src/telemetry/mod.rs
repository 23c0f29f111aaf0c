//! Mirrors node events to the log sink.
//!
//! The node keeps its own event ring; after every pass the node task hands
//! the ring to an [`EventCursor`], which emits the entries it has not seen yet
//! through defmt on the target or stdout on the host.

use ecu_core::node::NodeRole;
use ecu_core::telemetry::{EventId, EventLog, EventRecord};

/// Remembers the newest event already emitted.
pub struct EventCursor {
    last: Option<EventId>,
}

impl EventCursor {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Passes unseen records to `emit`, oldest first, and returns how many
    /// there were.
    pub fn drain<const N: usize>(
        &mut self,
        log: &EventLog<N>,
        mut emit: impl FnMut(&EventRecord),
    ) -> usize {
        let mut count = 0;
        for record in log.newer_than(self.last) {
            emit(record);
            self.last = Some(record.id);
            count += 1;
        }
        count
    }
}

impl Default for EventCursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "none")]
pub fn log_event(role: NodeRole, record: &EventRecord) {
    defmt::info!(
        "telemetry:ecu{} t={} {} {}",
        role.ecu(),
        record.tick,
        record.event.label(),
        record.event.detail()
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_event(role: NodeRole, record: &EventRecord) {
    println!("telemetry:{role} t={} {}", record.tick, record.event);
}
