//! Compile-time tuning for both node images.
//!
//! Every window is expressed in ticks. Boards pass `DEFAULT`; the emulator and
//! tests may shrink windows to keep scenarios short.

use crate::ticks::Tick;

/// Tuning for the master (sensing, bus-owning) node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MasterConfig {
    /// Reported temperatures strictly above this value count as overheating.
    pub temperature_threshold: u8,
    /// Time above threshold before the peer voltage is queried.
    pub dtc_confirm_ticks: Tick,
    /// Silence after which the communication-lost indicator is raised.
    pub keep_alive_timeout: Tick,
    /// How long the communication-lost indicator blinks per episode.
    pub comm_indicator_window: Tick,
    /// Silence after which communication failure is reported.
    pub comm_failure_ticks: Tick,
    /// How long the overheat blink runs before it is dropped.
    pub blink_window: Tick,
    /// Passes a latched fault is displayed before outbound CAN is disabled.
    pub gate_bounds: GateBounds,
    /// Temperature samples averaged by the tester read-sensor command.
    pub tester_samples: u8,
}

impl MasterConfig {
    pub const DEFAULT: Self = Self {
        temperature_threshold: 25,
        dtc_confirm_ticks: 3_000,
        keep_alive_timeout: 5_000,
        comm_indicator_window: 20_000,
        comm_failure_ticks: 30_000,
        blink_window: 20_000,
        gate_bounds: GateBounds::DEFAULT,
        tester_samples: 100,
    };
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Tuning for the slave (mirroring, sensor-owning) node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SlaveConfig {
    /// Silence after which the communication-lost indicator is raised.
    pub keep_alive_timeout: Tick,
    /// How long the communication-lost indicator blinks per episode.
    pub comm_indicator_window: Tick,
    /// How long the overheat blink runs before it is dropped.
    pub blink_window: Tick,
    /// Temperature averaging window.
    pub average_window: Tick,
    /// Temperature samples averaged by the tester read-sensor command.
    pub tester_samples: u8,
}

impl SlaveConfig {
    pub const DEFAULT: Self = Self {
        keep_alive_timeout: 10_000,
        comm_indicator_window: 20_000,
        blink_window: 20_000,
        average_window: 500,
        tester_samples: 100,
    };
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Display passes per latched fault before outbound CAN is gated off.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GateBounds {
    pub overheat: u16,
    pub voltage: u16,
    pub communication: u16,
}

impl GateBounds {
    pub const DEFAULT: Self = Self {
        overheat: 40,
        voltage: 100,
        communication: 100,
    };
}
