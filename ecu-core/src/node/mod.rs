//! Node runtime shared by the master and slave images.
//!
//! A node owns its collaborators (storage, bus, LEDs, console, inputs), its
//! fault manager and event log, and is driven by a [`TaskTable`] that calls
//! back into it. Collaborator failures never abort a task: they are turned
//! into [`NodeEvent`]s at the point where the task would have used the result.

pub mod master;
pub mod slave;

use core::fmt;

use heapless::Vec;

use crate::can::protocol::{GPIO_ON, Message};
use crate::can::{CanBus, ObjectSlot};
use crate::dtc::{CounterUpdate, DtcCode, DtcManager};
use crate::inputs::{Buttons, Sensors};
use crate::presentation::{Console, Indicators, Led, LedPanel, print_line};
use crate::scheduler::{TaskFn, TaskId, TaskTable};
use crate::storage::{NvCell, NvStorage};
use crate::telemetry::{EventLog, NodeEvent};
use crate::tester::{self, INPUT_BURST, TesterCommand, TesterInput, TesterSession};
use crate::ticks::{Tick, TickCounters, TimerId};

/// Collaborator types a board provides.
pub trait Platform {
    type Storage: NvStorage;
    type Bus: CanBus;
    type Indicators: Indicators;
    type Console: Console;
    type Inputs: Sensors + Buttons;
}

/// Collaborator instances handed to a node at construction.
pub struct Board<P: Platform> {
    pub storage: P::Storage,
    pub bus: P::Bus,
    pub indicators: P::Indicators,
    pub console: P::Console,
    pub inputs: P::Inputs,
}

/// Which side of the link a node plays.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeRole {
    Master,
    Slave,
}

impl NodeRole {
    /// ECU number used in operator messages.
    #[must_use]
    pub const fn ecu(self) -> u8 {
        match self {
            NodeRole::Master => 1,
            NodeRole::Slave => 2,
        }
    }

    /// ECU number of the other node.
    #[must_use]
    pub const fn peer(self) -> u8 {
        match self {
            NodeRole::Master => 2,
            NodeRole::Slave => 1,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => f.write_str("master"),
            NodeRole::Slave => f.write_str("slave"),
        }
    }
}

/// Scheduler reconfiguration requested by a task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModeChange {
    /// Only the tester task may run.
    IsolateTester,
    /// Every task runs again.
    ReleaseAll,
}

/// Communication-loss indicator step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HeartbeatOutcome {
    Idle,
    Blinking,
    /// The indicator window ran out this pass and the indicator was cleared.
    Expired,
}

/// One entry of a node's task plan.
pub struct TaskSpec<C> {
    pub run: TaskFn<C>,
    pub period: Tick,
    pub priority: u8,
}

impl<C> TaskSpec<C> {
    #[must_use]
    pub const fn new(run: TaskFn<C>, period: Tick, priority: u8) -> Self {
        Self {
            run,
            period,
            priority,
        }
    }
}

/// Hooks the pass driver needs from a node.
pub trait Node {
    fn now(&self) -> Tick;
    fn take_mode_change(&mut self) -> Option<ModeChange>;
}

/// A node together with the task table that drives it.
pub struct Ecu<C, const N: usize> {
    tasks: TaskTable<C, N>,
    tester: Option<TaskId>,
    node: C,
}

impl<C: Node, const N: usize> Ecu<C, N> {
    /// Registers `plan`, sorts it by priority and remembers where `tester`
    /// ended up. Entries beyond the table capacity are dropped.
    pub fn new(node: C, plan: &[TaskSpec<C>], tester: TaskFn<C>) -> Self {
        let mut tasks = TaskTable::new();
        for spec in plan {
            let _ = tasks.register(spec.run, spec.period, spec.priority);
        }
        tasks.sort_by_priority();
        let tester = tasks.find(tester);
        Self {
            tasks,
            tester,
            node,
        }
    }

    /// Dispatches at most one due task, then applies any mode change it
    /// requested.
    pub fn run_pass(&mut self) -> Option<TaskId> {
        let now = self.node.now();
        let ran = self.tasks.run_once(now, &mut self.node);
        match self.node.take_mode_change() {
            Some(ModeChange::IsolateTester) => {
                if let Some(tester) = self.tester {
                    self.tasks.isolate(tester);
                }
            }
            Some(ModeChange::ReleaseAll) => self.tasks.enable_all(),
            None => {}
        }
        ran
    }

    pub fn node(&self) -> &C {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut C {
        &mut self.node
    }

    pub fn tasks(&self) -> &TaskTable<C, N> {
        &self.tasks
    }
}

/// State and collaborators common to both node roles.
pub struct NodeCore<'t, P: Platform> {
    storage: P::Storage,
    bus: P::Bus,
    console: P::Console,
    inputs: P::Inputs,
    leds: LedPanel<P::Indicators>,
    dtc: DtcManager,
    ticks: &'t TickCounters,
    events: EventLog,
    tester: TesterSession,
    role: NodeRole,
    comm_indicator: bool,
    increment_latched: bool,
    mode_change: Option<ModeChange>,
}

impl<'t, P: Platform> NodeCore<'t, P> {
    fn new(board: Board<P>, ticks: &'t TickCounters, role: NodeRole, dtc: DtcManager) -> Self {
        Self {
            storage: board.storage,
            bus: board.bus,
            console: board.console,
            inputs: board.inputs,
            leds: LedPanel::new(board.indicators),
            dtc,
            ticks,
            events: EventLog::new(),
            tester: TesterSession::new(),
            role,
            comm_indicator: false,
            increment_latched: false,
            mode_change: None,
        }
    }

    /// Loads persisted fault state and enables the transmitter.
    fn boot(&mut self) -> DtcCode {
        let result = self.dtc.init(&mut self.storage);
        let code = self.persist(NvCell::Dtc, result).unwrap_or(DtcCode::None);
        self.bus.set_enabled(true);
        self.record(NodeEvent::Boot(code));
        code
    }

    fn record(&mut self, event: NodeEvent) {
        let tick = self.ticks.now();
        self.events.record(tick, event);
    }

    fn print(&mut self, args: fmt::Arguments<'_>) {
        print_line(&mut self.console, args);
    }

    /// Sends `message` if the transmitter is enabled. Returns `true` when the
    /// frame was queued.
    fn send(&mut self, message: Message) -> bool {
        if !self.bus.is_enabled() {
            return false;
        }
        match self.bus.send(&message.encode()) {
            Ok(()) => true,
            Err(_) => {
                self.record(NodeEvent::TransmitFailed(message.id().raw()));
                false
            }
        }
    }

    fn receive(&mut self, slot: ObjectSlot) -> Option<Message> {
        let frame = self.bus.receive(slot)?;
        Message::decode(&frame)
    }

    fn persist<T, E>(&mut self, cell: NvCell, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(_) => {
                self.record(NodeEvent::StorageFailed(cell));
                None
            }
        }
    }

    fn note_update(&mut self, update: CounterUpdate) {
        self.record(NodeEvent::CounterIncremented {
            counter: update.counter,
            reached: update.reached,
        });
        if let Some(code) = update.latched {
            self.record(NodeEvent::DtcLatched(code));
        }
    }

    fn set_can(&mut self, enabled: bool) {
        if self.bus.is_enabled() != enabled {
            self.bus.set_enabled(enabled);
            self.record(NodeEvent::CanEnabled(enabled));
        }
    }

    fn raise_comm_indicator(&mut self) {
        if !self.comm_indicator {
            self.comm_indicator = true;
            self.record(NodeEvent::CommLost);
        }
    }

    /// Peer traffic seen: drop the indicator and re-arm the episode counter.
    fn clear_comm_indicator(&mut self) {
        self.increment_latched = false;
        if self.comm_indicator {
            self.comm_indicator = false;
            self.record(NodeEvent::CommRestored);
        }
    }

    /// Drives the blue communication-loss indicator. The communication
    /// counter moves once per episode; `suppressed` parks the indicator.
    fn heartbeat(&mut self, window: Tick, suppressed: bool) -> HeartbeatOutcome {
        if !self.comm_indicator || suppressed {
            self.leds.off(Led::Blue);
            self.ticks.reset(TimerId::CommIndicator);
            return HeartbeatOutcome::Idle;
        }
        if !self.increment_latched {
            self.increment_latched = true;
            let result = self
                .dtc
                .increment_communication(&mut self.storage, &mut self.console);
            if let Some(update) = self.persist(NvCell::CommCounter, result) {
                self.note_update(update);
            }
        }
        if self.ticks.expired(TimerId::CommIndicator, window) {
            self.leds.off(Led::Blue);
            self.comm_indicator = false;
            return HeartbeatOutcome::Expired;
        }
        self.leds.blink(Led::Blue);
        HeartbeatOutcome::Blinking
    }

    /// One tester-task pass: announcement blink, chord handling and operator
    /// commands. Returns the commands that ran.
    fn tester_pass(&mut self, samples: u8) -> Vec<TesterCommand, INPUT_BURST> {
        let mut ran = Vec::new();
        self.step_announcement();
        let chord = !self.tester.is_announcing() && self.inputs.chord();

        if !self.tester.is_active() {
            if chord {
                self.enter_tester();
            }
            return ran;
        }
        if chord {
            self.print(format_args!("Both buttons pressed. Exiting Tester Mode..."));
            self.exit_tester();
            return ran;
        }

        for input in self.tester.poll_input(&mut self.console) {
            match input {
                TesterInput::Invalid(_) => self.print(format_args!("Invalid Command")),
                TesterInput::Command(command) => {
                    self.run_tester_command(command, samples);
                    let _ = ran.push(command);
                    if command == TesterCommand::Exit {
                        break;
                    }
                }
            }
        }
        ran
    }

    fn step_announcement(&mut self) {
        if let Some(state) = self.tester.announcement(self.ticks) {
            self.leds.set(Led::White, state);
        }
    }

    fn enter_tester(&mut self) {
        self.print(format_args!("Entering Tester Mode..."));
        self.tester.enter(self.ticks);
        self.step_announcement();
        self.set_can(true);
        tester::print_menu(&mut self.console, self.role.ecu(), self.role.peer());
        self.record(NodeEvent::TesterEntered);
        self.mode_change = Some(ModeChange::IsolateTester);
    }

    fn exit_tester(&mut self) {
        self.tester.exit(self.ticks);
        self.step_announcement();
        self.set_can(true);
        self.print(format_args!("Exited Tester Mode"));
        self.record(NodeEvent::TesterExited);
        self.mode_change = Some(ModeChange::ReleaseAll);
    }

    fn run_tester_command(&mut self, command: TesterCommand, samples: u8) {
        match command {
            TesterCommand::ReadDtc => {
                self.print(format_args!("Reading DTC..."));
                let result = self.dtc.read_dtc(&mut self.storage, &mut self.console);
                let _ = self.persist(NvCell::Dtc, result);
            }
            TesterCommand::ClearDtc => {
                self.print(format_args!("Clearing DTC..."));
                self.set_can(true);
                let result = self.dtc.clear_dtc(&mut self.storage, &mut self.console);
                if self.persist(NvCell::Dtc, result).is_some() {
                    self.record(NodeEvent::DtcCleared);
                }
                self.leds.off(Led::Red);
            }
            TesterCommand::ReadSensor => {
                self.print(format_args!("Reading Sensor Data..."));
                self.tester.start_sampling(samples);
            }
            TesterCommand::GpioPeer => {
                let peer = self.role.peer();
                self.print(format_args!("Testing GPIO on ECU {peer}..."));
                if self.send(Message::Gpio(GPIO_ON)) {
                    self.record(NodeEvent::GpioCommand(GPIO_ON));
                }
            }
            TesterCommand::GpioLocal => {
                let ecu = self.role.ecu();
                self.print(format_args!("Testing GPIO on ECU {ecu}..."));
                self.leds.on(Led::Red);
            }
            TesterCommand::Exit => {
                self.print(format_args!("Exiting Tester Mode..."));
                self.exit_tester();
            }
        }
    }

    /// Feeds one read-sensor sample and reports the average when complete.
    fn tester_sample(&mut self, value: u8) {
        if let Some(average) = self.tester.sample(value) {
            self.print(format_args!("Average Temperature: {average}°C"));
            self.record(NodeEvent::TemperatureReported(average));
        }
    }

    fn take_mode_change(&mut self) -> Option<ModeChange> {
        self.mode_change.take()
    }
}

/// Read access used by the firmware, the emulator and tests.
impl<P: Platform> NodeCore<'_, P> {
    #[must_use]
    pub const fn role(&self) -> NodeRole {
        self.role
    }

    pub fn leds(&self) -> &LedPanel<P::Indicators> {
        &self.leds
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn dtc(&self) -> &DtcManager {
        &self.dtc
    }

    pub fn storage(&self) -> &P::Storage {
        &self.storage
    }

    pub fn bus(&self) -> &P::Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut P::Bus {
        &mut self.bus
    }

    pub fn console(&self) -> &P::Console {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut P::Console {
        &mut self.console
    }

    pub fn inputs_mut(&mut self) -> &mut P::Inputs {
        &mut self.inputs
    }

    #[must_use]
    pub const fn comm_indicator(&self) -> bool {
        self.comm_indicator
    }

    #[must_use]
    pub const fn tester_active(&self) -> bool {
        self.tester.is_active()
    }
}
