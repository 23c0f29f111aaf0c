use ecu_core::can::mailbox::ObjectDef;
use ecu_core::can::protocol;
use ecu_core::node::Board;
use embassy_futures::yield_now;

#[cfg(not(feature = "slave"))]
use ecu_core::{config::MasterConfig, node::master::MasterNode};
#[cfg(feature = "slave")]
use ecu_core::{config::SlaveConfig, node::slave::SlaveNode};

use super::{NODE_PASSES, TICKS};
use crate::hw::FirmwarePlatform;
use crate::telemetry::{EventCursor, log_event};

#[cfg(not(feature = "slave"))]
pub const OBJECTS: &[ObjectDef] = &protocol::MASTER_OBJECTS;
#[cfg(feature = "slave")]
pub const OBJECTS: &[ObjectDef] = &protocol::SLAVE_OBJECTS;

#[embassy_executor::task]
pub async fn run(board: Board<FirmwarePlatform>) -> ! {
    #[cfg(not(feature = "slave"))]
    let mut ecu = MasterNode::new(board, &TICKS, MasterConfig::DEFAULT).into_ecu();
    #[cfg(feature = "slave")]
    let mut ecu = SlaveNode::new(board, &TICKS, SlaveConfig::DEFAULT).into_ecu();

    let role = ecu.node().core().role();
    defmt::info!("node: ecu{} running", role.ecu());

    let mut cursor = EventCursor::new();
    loop {
        ecu.run_pass();
        NODE_PASSES.record();
        cursor.drain(ecu.node().core().events(), |record| log_event(role, record));
        yield_now().await;
    }
}
