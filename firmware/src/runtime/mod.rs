use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use ecu_core::node::Board;
use ecu_core::ticks::TickCounters;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::{Adc, AdcChannel};
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::wdg::IndependentWatchdog;

use crate::hw::can::CanLink;
use crate::hw::flash::FlashStorage;
use crate::hw::inputs::BoardInputs;
use crate::hw::leds::{LedPatterns, PatternLeds};
use crate::hw::uart::ConsoleQueue;
use crate::hw::watchdog::PassCounter;

mod can_task;
mod console_task;
mod led_task;
mod node_task;
mod tick_task;
mod watchdog_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static TICKS: TickCounters = TickCounters::new();
pub(super) static CAN_LINK: CanLink = CanLink::new();
pub(super) static CONSOLE: ConsoleQueue = ConsoleQueue::new();
pub(super) static LED_PATTERNS: LedPatterns = LedPatterns::new();
pub(super) static NODE_PASSES: PassCounter = PassCounter::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA2,
        PA3,
        PA4,
        PA5,
        PA11,
        PA12,
        PB3,
        PB4,
        PB5,
        PB6,
        ADC1,
        FDCAN1,
        FLASH,
        IWDG,
        USART2,
        ..
    } = hal::init(config);

    CAN_LINK
        .configure(node_task::OBJECTS)
        .expect("object table exceeds the mailbox bank");

    let storage =
        FlashStorage::new(Flash::new_blocking(FLASH)).expect("failed to read the fault page");
    let inputs = BoardInputs::new(
        Adc::new(ADC1),
        PA0.degrade_adc(),
        PA1.degrade_adc(),
        Input::new(PA4, Pull::Up),
        Input::new(PA5, Pull::Up),
    );
    let board = Board {
        storage,
        bus: CAN_LINK.bus(),
        indicators: PatternLeds::new(&LED_PATTERNS),
        console: CONSOLE.console(),
        inputs,
    };

    spawner
        .spawn(tick_task::run(&TICKS))
        .expect("failed to spawn tick task");

    spawner
        .spawn(led_task::run(
            &LED_PATTERNS,
            [
                Output::new(PB3, Level::Low, Speed::Low),
                Output::new(PB4, Level::Low, Speed::Low),
                Output::new(PB5, Level::Low, Speed::Low),
                Output::new(PB6, Level::Low, Speed::Low),
            ],
        ))
        .expect("failed to spawn LED task");

    spawner
        .spawn(can_task::run(&CAN_LINK, FDCAN1, PA11, PA12))
        .expect("failed to spawn CAN task");
    spawner
        .spawn(console_task::run(&CONSOLE, USART2, PA2, PA3))
        .expect("failed to spawn console task");

    spawner
        .spawn(node_task::run(board))
        .expect("failed to spawn node task");

    #[allow(clippy::cast_possible_truncation)]
    let timeout_us = watchdog_task::TIMEOUT.as_micros() as u32;
    spawner
        .spawn(watchdog_task::run(
            IndependentWatchdog::new(IWDG, timeout_us),
            &NODE_PASSES,
        ))
        .expect("failed to spawn watchdog task");

    core::future::pending::<()>().await;
}
