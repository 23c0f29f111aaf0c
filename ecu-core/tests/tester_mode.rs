mod support;

use ecu_core::can::protocol::{GPIO_ON, MASTER_OBJECTS, Message, SLAVE_OBJECTS};
use ecu_core::config::{MasterConfig, SlaveConfig};
use ecu_core::dtc::DtcCode;
use ecu_core::node::master::MasterNode;
use ecu_core::node::slave::SlaveNode;
use ecu_core::presentation::{Led, LedState};
use ecu_core::storage::{NvCell, RamStorage};
use ecu_core::telemetry::NodeEvent;
use ecu_core::ticks::TickCounters;

use support::{TestMaster, board, master_bus, run};

fn press_chord(master: &mut TestMaster<'_>, held: bool) {
    let inputs = master.node_mut().core_mut().inputs_mut();
    inputs.left = held;
    inputs.right = held;
}

fn type_keys(master: &mut TestMaster<'_>, keys: &str) {
    master.node_mut().core_mut().console_mut().type_keys(keys);
}

fn take_output(master: &mut TestMaster<'_>) -> String {
    master.node_mut().core_mut().console_mut().take_output()
}

#[test]
fn chord_enters_tester_mode_and_isolates_the_tester_task() {
    let ticks = TickCounters::new();
    let mut master =
        MasterNode::new(board(&MASTER_OBJECTS, RamStorage::erased()), &ticks, MasterConfig::DEFAULT)
            .into_ecu();

    press_chord(&mut master, true);
    run(&mut master, &ticks, 200);
    press_chord(&mut master, false);

    assert!(master.node().core().tester_active());
    let enabled = master.tasks().iter().filter(|task| task.enabled).count();
    assert_eq!(enabled, 1, "only the tester task may run in tester mode");

    let output = take_output(&mut master);
    assert!(output.starts_with("Entering Tester Mode...\r\nEntering Tester Mode. Send commands:\r\n"));
    assert!(output.contains("4: Test GPIO ECU2\r\n5: Test GPIO ECU1\r\n"));
    assert!(output.ends_with("Press both buttons to exit Tester Mode.\r\n"));
    assert_eq!(master.node().core().leds().state(Led::White), LedState::On);

    master_bus(&mut master).drain_sent();
    run(&mut master, &ticks, 1_000);
    assert!(
        master_bus(&mut master).sent.is_empty(),
        "keep-alives stop while isolated"
    );
}

#[test]
fn operator_commands_run_in_order() {
    let ticks = TickCounters::new();
    let storage = RamStorage::from_cells([1, 1, 0, 2, 0]);
    let mut master =
        MasterNode::new(board(&MASTER_OBJECTS, storage), &ticks, MasterConfig::DEFAULT).into_ecu();

    press_chord(&mut master, true);
    run(&mut master, &ticks, 200);
    press_chord(&mut master, false);
    take_output(&mut master);
    master_bus(&mut master).drain_sent();

    type_keys(&mut master, "1\r\n9");
    run(&mut master, &ticks, 200);
    assert_eq!(
        take_output(&mut master),
        "Reading DTC...\r\nCurrent DTC: 1\r\nInvalid Command\r\n"
    );

    type_keys(&mut master, "2");
    run(&mut master, &ticks, 200);
    assert_eq!(
        take_output(&mut master),
        "Clearing DTC...\r\nDTC Cleared Successfully\r\n"
    );
    let core = master.node().core();
    assert_eq!(core.dtc().active(), DtcCode::None);
    assert_eq!(core.storage().peek(NvCell::CommCounter), 0);
    assert_eq!(core.storage().peek(NvCell::OverheatCounter), 1);

    type_keys(&mut master, "45");
    run(&mut master, &ticks, 200);
    assert_eq!(
        take_output(&mut master),
        "Testing GPIO on ECU 2...\r\nTesting GPIO on ECU 1...\r\n"
    );
    assert!(master_bus(&mut master).sent.contains(&Message::Gpio(GPIO_ON).encode()));
    assert_eq!(master.node().core().leds().state(Led::Red), LedState::On);
}

#[test]
fn exit_key_restores_every_task() {
    let ticks = TickCounters::new();
    let mut master =
        MasterNode::new(board(&MASTER_OBJECTS, RamStorage::erased()), &ticks, MasterConfig::DEFAULT)
            .into_ecu();

    press_chord(&mut master, true);
    run(&mut master, &ticks, 200);
    press_chord(&mut master, false);
    take_output(&mut master);

    type_keys(&mut master, "61");
    run(&mut master, &ticks, 200);

    assert_eq!(
        take_output(&mut master),
        "Exiting Tester Mode...\r\nExited Tester Mode\r\n",
        "keys after exit are not processed"
    );
    assert!(!master.node().core().tester_active());
    assert!(master.tasks().iter().all(|task| task.enabled));
    let events = master.node().core().events();
    assert!(events.contains(|event| *event == NodeEvent::TesterEntered));
    assert!(events.contains(|event| *event == NodeEvent::TesterExited));

    run(&mut master, &ticks, 2_500);
    assert_eq!(master.node().core().leds().state(Led::White), LedState::Off);
}

#[test]
fn chord_is_ignored_during_the_announcement() {
    let ticks = TickCounters::new();
    let mut master =
        MasterNode::new(board(&MASTER_OBJECTS, RamStorage::erased()), &ticks, MasterConfig::DEFAULT)
            .into_ecu();

    press_chord(&mut master, true);
    run(&mut master, &ticks, 1_500);
    assert!(master.node().core().tester_active(), "held chord must not toggle back out");

    run(&mut master, &ticks, 1_000);
    assert!(!master.node().core().tester_active(), "chord exits once the blink is over");
    assert!(take_output(&mut master).contains("Both buttons pressed. Exiting Tester Mode...\r\n"));
}

#[test]
fn right_button_alone_injects_faults() {
    let ticks = TickCounters::new();
    let mut master =
        MasterNode::new(board(&MASTER_OBJECTS, RamStorage::erased()), &ticks, MasterConfig::DEFAULT)
            .into_ecu();

    for _ in 0..3 {
        master.node_mut().core_mut().inputs_mut().right = true;
        run(&mut master, &ticks, 200);
        master.node_mut().core_mut().inputs_mut().right = false;
        run(&mut master, &ticks, 200);
    }

    let core = master.node().core();
    assert_eq!(core.dtc().active(), DtcCode::Overheat);
    assert_eq!(core.storage().peek(NvCell::ButtonCounter), 0);
    assert_eq!(core.storage().peek(NvCell::OverheatCounter), 0);
}

#[test]
fn slave_read_sensor_averages_local_readings() {
    let ticks = TickCounters::new();
    let config = SlaveConfig {
        tester_samples: 4,
        ..SlaveConfig::DEFAULT
    };
    let mut slave = SlaveNode::new(board(&SLAVE_OBJECTS, RamStorage::erased()), &ticks, config).into_ecu();
    {
        let inputs = slave.node_mut().core_mut().inputs_mut();
        inputs.left = true;
        inputs.right = true;
        inputs.temperature = 31;
    }
    run(&mut slave, &ticks, 300);
    {
        let inputs = slave.node_mut().core_mut().inputs_mut();
        inputs.left = false;
        inputs.right = false;
    }
    assert!(slave.node().core().tester_active());
    let output = slave.node_mut().core_mut().console_mut().take_output();
    assert!(output.contains("4: Test GPIO ECU1\r\n5: Test GPIO ECU2\r\n"));

    slave.node_mut().core_mut().console_mut().type_keys("3");
    run(&mut slave, &ticks, 1_000);

    let output = slave.node_mut().core_mut().console_mut().take_output();
    assert!(output.starts_with("Reading Sensor Data...\r\n"));
    assert!(output.contains("Average Temperature: 31°C\r\n"));
}
