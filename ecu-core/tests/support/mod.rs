#![allow(dead_code)]

use std::collections::VecDeque;
use std::fmt;

use ecu_core::can::mailbox::{MailboxBank, ObjectDef};
use ecu_core::can::{BusError, CanBus, CanFrame, ObjectSlot};
use ecu_core::inputs::{Buttons, Sensors};
use ecu_core::node::master::{MasterEcu, MasterNode};
use ecu_core::node::slave::{SlaveEcu, SlaveNode};
use ecu_core::node::{Board, Ecu, Node, Platform};
use ecu_core::presentation::{Console, Indicators, Led, LedState};
use ecu_core::storage::RamStorage;
use ecu_core::ticks::TickCounters;

pub struct MockBus {
    bank: MailboxBank<8>,
    pub sent: Vec<CanFrame>,
    enabled: bool,
}

impl MockBus {
    pub fn new(table: &[ObjectDef]) -> Self {
        Self {
            bank: MailboxBank::from_table(table).expect("object table should fit the bank"),
            sent: Vec::new(),
            enabled: false,
        }
    }

    pub fn inject(&mut self, frame: &CanFrame) -> usize {
        self.bank.deliver(frame)
    }

    pub fn drain_sent(&mut self) -> Vec<CanFrame> {
        std::mem::take(&mut self.sent)
    }
}

impl CanBus for MockBus {
    type Error = BusError;

    fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        if !self.enabled {
            return Err(BusError::Disabled);
        }
        self.sent.push(frame.clone());
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

#[derive(Default)]
pub struct MockLeds {
    pub history: Vec<(Led, LedState)>,
}

impl Indicators for MockLeds {
    fn set(&mut self, led: Led, state: LedState) {
        self.history.push((led, state));
    }
}

#[derive(Default)]
pub struct MockConsole {
    pub output: String,
    pub input: VecDeque<u8>,
}

impl MockConsole {
    pub fn type_keys(&mut self, keys: &str) {
        self.input.extend(keys.bytes());
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl fmt::Write for MockConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.output.push_str(s);
        Ok(())
    }
}

impl Console for MockConsole {
    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }
}

pub struct MockInputs {
    pub temperature: u8,
    pub voltage: u8,
    pub left: bool,
    pub right: bool,
}

impl Default for MockInputs {
    fn default() -> Self {
        Self {
            temperature: 20,
            voltage: 3,
            left: false,
            right: false,
        }
    }
}

impl Sensors for MockInputs {
    fn read_temperature(&mut self) -> u8 {
        self.temperature
    }

    fn read_voltage(&mut self) -> u8 {
        self.voltage
    }
}

impl Buttons for MockInputs {
    fn left(&mut self) -> bool {
        self.left
    }

    fn right(&mut self) -> bool {
        self.right
    }
}

pub struct TestPlatform;

impl Platform for TestPlatform {
    type Storage = RamStorage;
    type Bus = MockBus;
    type Indicators = MockLeds;
    type Console = MockConsole;
    type Inputs = MockInputs;
}

pub fn board(table: &[ObjectDef], storage: RamStorage) -> Board<TestPlatform> {
    Board {
        storage,
        bus: MockBus::new(table),
        indicators: MockLeds::default(),
        console: MockConsole::default(),
        inputs: MockInputs::default(),
    }
}

/// Advances `ticks` one tick at a time, giving the node one pass per tick.
pub fn run<C: Node, const N: usize>(ecu: &mut Ecu<C, N>, ticks: &TickCounters, count: u32) {
    for _ in 0..count {
        ticks.on_tick();
        ecu.run_pass();
    }
}

pub type TestMaster<'t> = MasterEcu<'t, TestPlatform>;
pub type TestSlave<'t> = SlaveEcu<'t, TestPlatform>;

pub fn master_bus<'a>(ecu: &'a mut TestMaster<'_>) -> &'a mut MockBus {
    ecu.node_mut().core_mut().bus_mut()
}

pub fn slave_bus<'a>(ecu: &'a mut TestSlave<'_>) -> &'a mut MockBus {
    ecu.node_mut().core_mut().bus_mut()
}

/// Two nodes on one wire, each with its own tick source.
pub struct Link<'t> {
    pub master: TestMaster<'t>,
    pub slave: TestSlave<'t>,
    master_ticks: &'t TickCounters,
    slave_ticks: &'t TickCounters,
}

impl<'t> Link<'t> {
    pub fn new(
        master: MasterNode<'t, TestPlatform>,
        slave: SlaveNode<'t, TestPlatform>,
        master_ticks: &'t TickCounters,
        slave_ticks: &'t TickCounters,
    ) -> Self {
        Self {
            master: master.into_ecu(),
            slave: slave.into_ecu(),
            master_ticks,
            slave_ticks,
        }
    }

    pub fn run(&mut self, count: u32) {
        for _ in 0..count {
            self.master_ticks.on_tick();
            self.slave_ticks.on_tick();
            self.master.run_pass();
            self.slave.run_pass();
            self.exchange();
        }
    }

    fn exchange(&mut self) {
        for frame in master_bus(&mut self.master).drain_sent() {
            slave_bus(&mut self.slave).inject(&frame);
        }
        for frame in slave_bus(&mut self.slave).drain_sent() {
            master_bus(&mut self.master).inject(&frame);
        }
    }
}
