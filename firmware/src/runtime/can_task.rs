use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::can::{self, CanConfigurator, frame::Frame};
use embassy_time::{Duration, Timer};

use crate::hw::can::{CAN_BITRATE, CanLink, from_wire, to_wire};

embassy_stm32::bind_interrupts!(struct CanIrqs {
    TIM16_FDCAN_IT0 => can::IT0InterruptHandler<hal::peripherals::FDCAN1>;
    TIM17_FDCAN_IT1 => can::IT1InterruptHandler<hal::peripherals::FDCAN1>;
});

#[embassy_executor::task]
pub async fn run(
    link: &'static CanLink,
    fdcan: Peri<'static, hal::peripherals::FDCAN1>,
    rx_pin: Peri<'static, hal::peripherals::PA11>,
    tx_pin: Peri<'static, hal::peripherals::PA12>,
) -> ! {
    let mut configurator = CanConfigurator::new(fdcan, rx_pin, tx_pin, CanIrqs);
    configurator.set_bitrate(CAN_BITRATE);
    let (mut tx, mut rx, _properties) = configurator.into_normal_mode().split();

    let outbound = link.outbound();
    let transmit = async move {
        loop {
            let frame = outbound.receive().await;
            match to_wire::<Frame>(&frame) {
                Some(wire) => {
                    let _ = tx.write(&wire).await;
                }
                None => defmt::warn!("can: cannot encode frame id={}", frame.id.raw()),
            }
        }
    };

    let receive = async move {
        let mut overruns = 0;
        loop {
            match rx.read().await {
                Ok(envelope) => {
                    let Some(frame) = from_wire(&envelope.frame) else {
                        continue;
                    };
                    if link.deliver(&frame) == 0 {
                        defmt::trace!("can: no object for id={}", frame.id.raw());
                    }
                    let total = link.overruns();
                    if total != overruns {
                        defmt::warn!("can: {} unread frames overwritten", total - overruns);
                        overruns = total;
                    }
                }
                Err(error) => {
                    defmt::warn!("can: bus error {}", defmt::Debug2Format(&error));
                    Timer::after(Duration::from_millis(5)).await;
                }
            }
        }
    };

    join(transmit, receive).await;
    loop {
        core::future::pending::<()>().await;
    }
}
