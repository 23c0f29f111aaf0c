mod support;

use ecu_core::can::CanBus;
use ecu_core::can::protocol::{MASTER_OBJECTS, Message, SLAVE_OBJECTS};
use ecu_core::config::{MasterConfig, SlaveConfig};
use ecu_core::dtc::DtcCode;
use ecu_core::node::master::MasterNode;
use ecu_core::node::slave::SlaveNode;
use ecu_core::presentation::{Led, LedState};
use ecu_core::state::SystemState;
use ecu_core::storage::{NvCell, RamStorage};
use ecu_core::telemetry::NodeEvent;
use ecu_core::ticks::TickCounters;

use support::{board, master_bus, run, slave_bus};

fn comm_lost_events(events: &ecu_core::telemetry::EventLog) -> usize {
    events
        .oldest_first()
        .filter(|record| record.event == NodeEvent::CommLost)
        .count()
}

#[test]
fn silence_raises_indicator_once_per_episode() {
    let ticks = TickCounters::new();
    let mut master =
        MasterNode::new(board(&MASTER_OBJECTS, RamStorage::erased()), &ticks, MasterConfig::DEFAULT)
            .into_ecu();

    run(&mut master, &ticks, 4_900);
    assert!(!master.node().core().comm_indicator());

    run(&mut master, &ticks, 7_000);
    let core = master.node().core();
    assert!(core.comm_indicator());
    assert_eq!(core.leds().state(Led::Blue), LedState::Blink);
    assert_eq!(core.storage().peek(NvCell::CommCounter), 1);
    assert_eq!(comm_lost_events(core.events()), 1);
    assert_eq!(master.node().state(), SystemState::CommunicationLost);

    run(&mut master, &ticks, 5_000);
    assert_eq!(
        master.node().core().storage().peek(NvCell::CommCounter),
        1,
        "re-entering the indicator must not count again"
    );
}

#[test]
fn temperature_report_rearms_the_episode() {
    let ticks = TickCounters::new();
    let mut master =
        MasterNode::new(board(&MASTER_OBJECTS, RamStorage::erased()), &ticks, MasterConfig::DEFAULT)
            .into_ecu();

    run(&mut master, &ticks, 6_000);
    assert!(master.node().core().comm_indicator());

    master_bus(&mut master).inject(&Message::Temperature(20).encode());
    run(&mut master, &ticks, 400);
    let core = master.node().core();
    assert!(!core.comm_indicator());
    assert_eq!(core.leds().state(Led::Blue), LedState::Off);
    assert!(core.events().contains(|event| *event == NodeEvent::CommRestored));

    run(&mut master, &ticks, 5_400);
    let core = master.node().core();
    assert!(core.comm_indicator());
    assert_eq!(core.storage().peek(NvCell::CommCounter), 2);
    assert_eq!(comm_lost_events(core.events()), 2);
}

#[test]
fn expired_indicator_does_not_count_again_without_traffic() {
    let ticks = TickCounters::new();
    let mut master =
        MasterNode::new(board(&MASTER_OBJECTS, RamStorage::erased()), &ticks, MasterConfig::DEFAULT)
            .into_ecu();

    run(&mut master, &ticks, 40_000);
    let core = master.node().core();
    assert_eq!(core.storage().peek(NvCell::CommCounter), 1);
    assert!(comm_lost_events(core.events()) >= 2, "indicator re-enters after its window");
    assert_eq!(master.node().state(), SystemState::CommunicationFailure);
}

#[test]
fn third_episode_latches_comm_dtc_and_gates_the_bus() {
    let ticks = TickCounters::new();
    let mut master =
        MasterNode::new(board(&MASTER_OBJECTS, RamStorage::erased()), &ticks, MasterConfig::DEFAULT)
            .into_ecu();

    for episode in 1..=3 {
        run(&mut master, &ticks, 6_000);
        if episode < 3 {
            assert_eq!(master.node().core().storage().peek(NvCell::CommCounter), episode);
        }
        master_bus(&mut master).inject(&Message::Temperature(20).encode());
        run(&mut master, &ticks, 400);
    }

    let core = master.node().core();
    assert_eq!(core.dtc().active(), DtcCode::CommunicationLost);
    assert_eq!(core.storage().peek(NvCell::Dtc), 3);
    assert_eq!(core.storage().peek(NvCell::CommCounter), 0);
    assert_eq!(core.leds().state(Led::Red), LedState::Blink);

    run(&mut master, &ticks, 25_000);
    assert!(
        !master.node().core().bus().is_enabled(),
        "transmitter should be gated off after the display bound"
    );
}

#[test]
fn slave_recovers_comm_dtc_on_keep_alive() {
    let ticks = TickCounters::new();
    let storage = RamStorage::from_cells([0, 3, 0, 2, 0]);
    let mut slave =
        SlaveNode::new(board(&SLAVE_OBJECTS, storage), &ticks, SlaveConfig::DEFAULT).into_ecu();
    assert_eq!(slave.node().core().dtc().active(), DtcCode::CommunicationLost);

    run(&mut slave, &ticks, 300);
    assert_eq!(slave.node().core().leds().state(Led::Red), LedState::Blink);

    slave_bus(&mut slave).inject(&Message::KeepAlive.encode());
    run(&mut slave, &ticks, 200);

    let core = slave.node().core();
    assert_eq!(core.dtc().active(), DtcCode::None);
    assert_eq!(core.storage().peek(NvCell::Dtc), 0);
    assert_eq!(core.storage().peek(NvCell::CommCounter), 0);
    assert!(core.events().contains(|event| *event == NodeEvent::DtcCleared));
}

#[test]
fn slave_silence_window_is_longer() {
    let ticks = TickCounters::new();
    let mut slave =
        SlaveNode::new(board(&SLAVE_OBJECTS, RamStorage::erased()), &ticks, SlaveConfig::DEFAULT)
            .into_ecu();

    run(&mut slave, &ticks, 9_500);
    assert!(!slave.node().core().comm_indicator());

    run(&mut slave, &ticks, 1_000);
    let core = slave.node().core();
    assert!(core.comm_indicator());
    assert_eq!(core.storage().peek(NvCell::CommCounter), 1);
}
