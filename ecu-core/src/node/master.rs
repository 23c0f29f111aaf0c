//! Master node: owns the system state and the bus schedule.
//!
//! The master sends keep-alives, evaluates the temperature the slave reports,
//! confirms overheats with a remote voltage query and broadcasts the resulting
//! state. It also carries the manual fault-injection button.

use crate::can::ObjectSlot;
use crate::can::protocol::Message;
use crate::config::MasterConfig;
use crate::dtc::{CanGate, DtcCode, DtcManager, OverheatIndication, VoltageVerdict};
use crate::inputs::Buttons;
use crate::presentation::Led;
use crate::state::SystemState;
use crate::storage::NvCell;
use crate::telemetry::NodeEvent;
use crate::ticks::{Tick, TickCounters, TimerId};

use super::{Board, Ecu, HeartbeatOutcome, ModeChange, Node, NodeCore, NodeRole, Platform, TaskSpec};

/// Task table capacity.
pub const MASTER_TASKS: usize = 10;

const TEMPERATURE_SLOT: ObjectSlot = ObjectSlot::from_const(2);
const VOLTAGE_SLOT: ObjectSlot = ObjectSlot::from_const(5);
const GPIO_SLOT: ObjectSlot = ObjectSlot::from_const(8);

/// Master node driven by its task table.
pub type MasterEcu<'t, P> = Ecu<MasterNode<'t, P>, MASTER_TASKS>;

pub struct MasterNode<'t, P: Platform> {
    core: NodeCore<'t, P>,
    config: MasterConfig,
    state: SystemState,
    last_broadcast: Option<SystemState>,
    last_temperature: u8,
    right_held: bool,
}

impl<'t, P: Platform> MasterNode<'t, P> {
    /// Builds the node and restores persisted fault state.
    pub fn new(board: Board<P>, ticks: &'t TickCounters, config: MasterConfig) -> Self {
        let dtc = DtcManager::new(config.gate_bounds, config.blink_window);
        let mut core = NodeCore::new(board, ticks, NodeRole::Master, dtc);
        core.boot();
        Self {
            core,
            config,
            state: SystemState::Normal,
            last_broadcast: None,
            last_temperature: 0,
            right_held: false,
        }
    }

    /// Wraps the node in its task table.
    pub fn into_ecu(self) -> MasterEcu<'t, P> {
        let plan: [TaskSpec<Self>; 7] = [
            TaskSpec::new(Self::tester, 200, 1),
            TaskSpec::new(Self::check_dtc, 200, 2),
            TaskSpec::new(Self::keep_alive, 100, 3),
            TaskSpec::new(Self::can_receive, 200, 4),
            TaskSpec::new(Self::overheat_blink, 200, 5),
            TaskSpec::new(Self::heartbeat, 200, 6),
            TaskSpec::new(Self::uart_status, 1_000, 7),
        ];
        let tester = plan[0].run;
        Ecu::new(self, &plan, tester)
    }

    /// State reported on the diagnostic UART.
    #[must_use]
    pub const fn state(&self) -> SystemState {
        self.state
    }

    pub fn core(&self) -> &NodeCore<'t, P> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut NodeCore<'t, P> {
        &mut self.core
    }

    fn broadcast(&mut self, state: SystemState) {
        if self.core.send(Message::State(state)) && self.last_broadcast != Some(state) {
            self.last_broadcast = Some(state);
            self.core.record(NodeEvent::StateBroadcast(state));
        }
    }

    /// Tester chord, manual fault injection and read-sensor sampling.
    pub fn tester(&mut self) {
        let was_active = self.core.tester.is_active();
        self.core.tester_pass(self.config.tester_samples);

        if !was_active && !self.core.tester.is_active() {
            self.inject_fault_on_press();
        }
        if self.core.tester.is_sampling() {
            self.core.send(Message::KeepAlive);
            if let Some(Message::Temperature(value)) = self.core.receive(TEMPERATURE_SLOT) {
                self.last_temperature = value;
            }
            self.core.tester_sample(self.last_temperature);
        }
    }

    fn inject_fault_on_press(&mut self) {
        let right = self.core.inputs.right();
        let pressed = right && !self.right_held && !self.core.inputs.left();
        self.right_held = right;
        if !pressed {
            return;
        }
        let core = &mut self.core;
        let result = core.dtc.increment_button(&mut core.storage, &mut core.console);
        if let Some(update) = core.persist(NvCell::ButtonCounter, result) {
            core.note_update(update);
        }
    }

    /// Displays the latched DTC, broadcasts it and gates the transmitter.
    pub fn check_dtc(&mut self) {
        let shown = match self.core.dtc.active() {
            DtcCode::None => None,
            DtcCode::Overheat => {
                self.core.leds.off(Led::Green);
                Some((SystemState::Fault, SystemState::Fault))
            }
            DtcCode::SensorDamaged => Some((SystemState::SensorDamaged, SystemState::UnexpectedVoltage)),
            DtcCode::CommunicationLost => {
                Some((SystemState::CommunicationLost, SystemState::CommunicationLost))
            }
        };
        if let Some((state, broadcast)) = shown {
            self.state = state;
            self.broadcast(broadcast);
            self.core.leds.blink(Led::Red);
            self.core.dtc.disarm_overheat_blink();
        }

        match self.core.dtc.gate_step() {
            CanGate::Open => self.core.set_can(true),
            CanGate::Counting(_) => {}
            CanGate::Closed => self.core.set_can(false),
        }
    }

    /// Sends the keep-alive and raises the indicator after a silent window.
    pub fn keep_alive(&mut self) {
        self.core.send(Message::KeepAlive);
        if self
            .core
            .ticks
            .expired(TimerId::CommLost, self.config.keep_alive_timeout)
        {
            self.core.raise_comm_indicator();
        }
    }

    /// Drains the receive objects.
    pub fn can_receive(&mut self) {
        if let Some(Message::Temperature(value)) = self.core.receive(TEMPERATURE_SLOT) {
            self.on_temperature(value);
        }
        if let Some(Message::VoltageReport(value)) = self.core.receive(VOLTAGE_SLOT) {
            self.on_voltage(value);
        }
        if let Some(Message::Gpio(value)) = self.core.receive(GPIO_SLOT) {
            self.core.leds.on(Led::Red);
            self.core.record(NodeEvent::GpioCommand(value));
        }
    }

    fn on_temperature(&mut self, value: u8) {
        let ticks = self.core.ticks;
        ticks.reset(TimerId::CommLost);
        ticks.reset(TimerId::CommFailure);
        self.core.clear_comm_indicator();
        self.last_temperature = value;

        if value > self.config.temperature_threshold {
            if self.core.dtc.overheat_blink_armed() {
                ticks.reset(TimerId::Dtc);
            }
            // One query per confirmation window; the reply lands a pass later.
            if ticks.expired(TimerId::Dtc, self.config.dtc_confirm_ticks)
                && self.core.send(Message::VoltageQuery)
            {
                ticks.reset(TimerId::Dtc);
                self.core.record(NodeEvent::VoltageQueried);
            }
        } else {
            self.state = SystemState::Normal;
            self.broadcast(SystemState::Normal);
            ticks.reset(TimerId::Dtc);
        }
    }

    fn on_voltage(&mut self, value: u8) {
        self.core.record(NodeEvent::VoltageReported(value));
        let core = &mut self.core;
        let result = core
            .dtc
            .check_voltage(value, &mut core.storage, &mut core.console);
        match core.persist(NvCell::OverheatCounter, result) {
            Some(VoltageVerdict::OverheatConfirmed(update)) => {
                self.core.note_update(update);
                self.state = SystemState::Overheat;
                self.broadcast(SystemState::Overheat);
            }
            Some(VoltageVerdict::SensorDamaged) => {
                self.state = SystemState::SensorDamaged;
                self.core.record(NodeEvent::DtcLatched(DtcCode::SensorDamaged));
            }
            Some(VoltageVerdict::Ignored) | None => {}
        }
        self.core.print(format_args!("Voltage ECU1: {value}v"));
    }

    /// Blinks the white LED while a confirmed overheat is pending.
    pub fn overheat_blink(&mut self) {
        let indication = self
            .core
            .dtc
            .supervise_overheat(self.core.ticks, self.core.comm_indicator);
        if self.core.tester.is_announcing() {
            return;
        }
        match indication {
            OverheatIndication::Blinking => {
                self.state = SystemState::Overheat;
                self.core.leds.blink(Led::White);
            }
            OverheatIndication::Idle | OverheatIndication::Suppressed => {
                self.core.leds.off(Led::White);
            }
        }
    }

    /// Communication-loss indicator and the long-silence failure state.
    pub fn heartbeat(&mut self) {
        let suppressed = self.core.dtc.is_latched();
        match self.core.heartbeat(self.config.comm_indicator_window, suppressed) {
            HeartbeatOutcome::Blinking => self.state = SystemState::CommunicationLost,
            HeartbeatOutcome::Expired => self.core.ticks.reset(TimerId::CommLost),
            HeartbeatOutcome::Idle => {}
        }
        if self
            .core
            .ticks
            .expired(TimerId::CommFailure, self.config.comm_failure_ticks)
        {
            self.state = SystemState::CommunicationFailure;
        }
    }

    /// Prints the status line.
    pub fn uart_status(&mut self) {
        let text = self.state.status_text();
        self.core.print(format_args!("{text}"));
    }
}

impl<P: Platform> Node for MasterNode<'_, P> {
    fn now(&self) -> Tick {
        self.core.ticks.now()
    }

    fn take_mode_change(&mut self) -> Option<ModeChange> {
        self.core.take_mode_change()
    }
}
