//! Slave node: samples the temperature sensor and mirrors the master.
//!
//! The slave answers keep-alives with its averaged temperature, answers
//! voltage queries, and shows the state the master broadcasts. A fault
//! broadcast is remembered across resets through the fault reminder cell.

use crate::can::ObjectSlot;
use crate::can::protocol::Message;
use crate::config::{GateBounds, SlaveConfig};
use crate::dtc::{DtcCode, DtcManager, OverheatIndication};
use crate::inputs::Sensors;
use crate::presentation::Led;
use crate::state::SystemState;
use crate::storage::{NvCell, NvStorage};
use crate::telemetry::NodeEvent;
use crate::tester::TesterCommand;
use crate::ticks::{Tick, TickCounters, TimerId};

use super::{Board, Ecu, HeartbeatOutcome, ModeChange, Node, NodeCore, NodeRole, Platform, TaskSpec};

/// Task table capacity.
pub const SLAVE_TASKS: usize = 16;

const KEEP_ALIVE_SLOT: ObjectSlot = ObjectSlot::from_const(1);
const VOLTAGE_QUERY_SLOT: ObjectSlot = ObjectSlot::from_const(4);
const STATE_SLOT: ObjectSlot = ObjectSlot::from_const(6);
const GPIO_SLOT: ObjectSlot = ObjectSlot::from_const(7);

/// Slave node driven by its task table.
pub type SlaveEcu<'t, P> = Ecu<SlaveNode<'t, P>, SLAVE_TASKS>;

/// Running mean over the current averaging window.
#[derive(Copy, Clone, Debug, Default)]
struct Averager {
    sum: u32,
    count: u32,
}

impl Averager {
    fn add(&mut self, value: u8) {
        self.sum += u32::from(value);
        self.count += 1;
    }

    fn mean(self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        u8::try_from(self.sum / self.count).ok()
    }
}

pub struct SlaveNode<'t, P: Platform> {
    core: NodeCore<'t, P>,
    config: SlaveConfig,
    fault_state: bool,
    reminder_set: bool,
    window: Averager,
    latest_average: Option<u8>,
    mirrored: Option<SystemState>,
}

impl<'t, P: Platform> SlaveNode<'t, P> {
    /// Builds the node and restores persisted fault state.
    pub fn new(board: Board<P>, ticks: &'t TickCounters, config: SlaveConfig) -> Self {
        let dtc = DtcManager::new(GateBounds::DEFAULT, config.blink_window);
        let mut core = NodeCore::new(board, ticks, NodeRole::Slave, dtc);
        core.boot();
        let result = core.storage.read(NvCell::FaultReminder);
        let reminder_set = core.persist(NvCell::FaultReminder, result) == Some(1);
        if reminder_set {
            core.record(NodeEvent::FaultReminder(true));
        }
        Self {
            core,
            config,
            fault_state: reminder_set,
            reminder_set,
            window: Averager::default(),
            latest_average: None,
            mirrored: None,
        }
    }

    /// Wraps the node in its task table.
    pub fn into_ecu(self) -> SlaveEcu<'t, P> {
        let plan: [TaskSpec<Self>; 7] = [
            TaskSpec::new(Self::sample_temperature, 10, 1),
            TaskSpec::new(Self::can_receive, 200, 2),
            TaskSpec::new(Self::comm_check, 200, 3),
            TaskSpec::new(Self::overheat_blink, 200, 4),
            TaskSpec::new(Self::heartbeat, 200, 5),
            TaskSpec::new(Self::check_dtc, 200, 6),
            TaskSpec::new(Self::tester, 200, 7),
        ];
        let tester = plan[6].run;
        Ecu::new(self, &plan, tester)
    }

    /// `true` while a fault broadcast from the master is being shown.
    #[must_use]
    pub const fn fault_state(&self) -> bool {
        self.fault_state
    }

    /// Last state received from the master.
    #[must_use]
    pub const fn mirrored(&self) -> Option<SystemState> {
        self.mirrored
    }

    /// Last completed temperature average.
    #[must_use]
    pub const fn latest_average(&self) -> Option<u8> {
        self.latest_average
    }

    pub fn core(&self) -> &NodeCore<'t, P> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut NodeCore<'t, P> {
        &mut self.core
    }

    fn set_reminder(&mut self, set: bool) {
        if self.reminder_set == set {
            return;
        }
        let result = self.core.storage.write(NvCell::FaultReminder, u32::from(set));
        if self.core.persist(NvCell::FaultReminder, result).is_some() {
            self.reminder_set = set;
            self.core.record(NodeEvent::FaultReminder(set));
        }
    }

    /// Accumulates readings and closes the window once it has elapsed.
    pub fn sample_temperature(&mut self) {
        let ticks = self.core.ticks;
        if ticks.elapsed(TimerId::Average) <= self.config.average_window {
            let reading = self.core.inputs.read_temperature();
            self.window.add(reading);
            return;
        }
        if let Some(mean) = self.window.mean() {
            self.latest_average = Some(mean);
        }
        self.window = Averager::default();
        ticks.reset(TimerId::Average);
    }

    /// Drains the receive objects.
    pub fn can_receive(&mut self) {
        if let Some(Message::KeepAlive) = self.core.receive(KEEP_ALIVE_SLOT) {
            self.on_keep_alive();
        }
        if let Some(Message::VoltageQuery) = self.core.receive(VOLTAGE_QUERY_SLOT) {
            self.on_voltage_query();
        }
        if let Some(Message::State(state)) = self.core.receive(STATE_SLOT) {
            self.on_state(state);
        }
        if let Some(Message::Gpio(value)) = self.core.receive(GPIO_SLOT) {
            self.core.leds.on(Led::Red);
            self.core.record(NodeEvent::GpioCommand(value));
        }
    }

    fn on_keep_alive(&mut self) {
        let temperature = match self.latest_average.or_else(|| self.window.mean()) {
            Some(value) => value,
            None => self.core.inputs.read_temperature(),
        };
        self.core.send(Message::Temperature(temperature));

        self.core.ticks.reset(TimerId::CommLost);
        self.core.clear_comm_indicator();
        self.fault_state = false;
        self.set_reminder(false);

        let core = &mut self.core;
        let result = core.dtc.recover_communication(&mut core.storage);
        if core.persist(NvCell::Dtc, result) == Some(true) {
            core.record(NodeEvent::DtcCleared);
        }
    }

    fn on_voltage_query(&mut self) {
        let voltage = self.core.inputs.read_voltage();
        self.core.print(format_args!("Voltage ECU2: {voltage}v"));
        if self.core.send(Message::VoltageReport(voltage)) {
            self.core.record(NodeEvent::VoltageReported(voltage));
        }
    }

    fn on_state(&mut self, state: SystemState) {
        if self.mirrored != Some(state) {
            self.mirrored = Some(state);
            self.core.record(NodeEvent::StateReceived(state));
        }
        match state {
            SystemState::Normal => {
                if !self.core.dtc.overheat_blink_armed() {
                    self.core.leds.off(Led::White);
                    self.core.leds.on(Led::Green);
                }
            }
            SystemState::Overheat => {
                self.core.leds.off(Led::Green);
                self.core.dtc.arm_overheat_blink();
            }
            SystemState::Fault | SystemState::UnexpectedVoltage => {
                self.core.leds.off(Led::Green);
                self.fault_state = true;
                self.set_reminder(true);
            }
            SystemState::CommunicationLost
            | SystemState::SensorDamaged
            | SystemState::CommunicationFailure => {}
        }
    }

    /// Raises the indicator after a keep-alive silence, unless a fault is
    /// already being shown.
    pub fn comm_check(&mut self) {
        if self.fault_state
            || !self
                .core
                .ticks
                .expired(TimerId::CommLost, self.config.keep_alive_timeout)
        {
            return;
        }
        if self.core.dtc.overheat_blink_armed() {
            self.core.leds.off(Led::White);
        }
        self.core.dtc.disarm_overheat_blink();
        self.core.raise_comm_indicator();
    }

    /// Blinks the white LED while an overheat broadcast is pending.
    pub fn overheat_blink(&mut self) {
        let suppressed = self.core.comm_indicator || self.fault_state;
        let indication = self.core.dtc.supervise_overheat(self.core.ticks, suppressed);
        if self.core.tester.is_announcing() {
            return;
        }
        match indication {
            OverheatIndication::Blinking => self.core.leds.blink(Led::White),
            OverheatIndication::Idle | OverheatIndication::Suppressed => {
                self.core.leds.off(Led::White);
            }
        }
    }

    /// Communication-loss indicator.
    pub fn heartbeat(&mut self) {
        let suppressed =
            self.fault_state || self.core.dtc.active() == DtcCode::CommunicationLost;
        if self.core.heartbeat(self.config.comm_indicator_window, suppressed)
            == HeartbeatOutcome::Blinking
        {
            self.core.leds.off(Led::Green);
        }
    }

    /// Shows a mirrored fault or a latched communication DTC.
    pub fn check_dtc(&mut self) {
        if self.fault_state || self.core.dtc.active() == DtcCode::CommunicationLost {
            self.core.leds.blink(Led::Red);
        }
    }

    /// Tester chord, operator commands and local read-sensor sampling.
    pub fn tester(&mut self) {
        let ran = self.core.tester_pass(self.config.tester_samples);
        if ran.contains(&TesterCommand::ClearDtc) {
            self.fault_state = false;
            self.set_reminder(false);
        }
        if self.core.tester.is_sampling() {
            let reading = self.core.inputs.read_temperature();
            self.core.tester_sample(reading);
        }
    }
}

impl<P: Platform> Node for SlaveNode<'_, P> {
    fn now(&self) -> Tick {
        self.core.ticks.now()
    }

    fn take_mode_change(&mut self) -> Option<ModeChange> {
        self.core.take_mode_change()
    }
}
