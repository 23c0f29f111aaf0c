//! Board adapters behind the `ecu-core` collaborator traits.
//!
//! Queue-backed adapters (CAN, UART console, LED patterns), the flash log
//! and the watchdog pass counter build on the host as well so they can be
//! unit tested; the pieces that touch Embassy peripherals are target-only.

pub mod can;
pub mod flash;
pub mod leds;
pub mod uart;
pub mod watchdog;

#[cfg(target_os = "none")]
pub mod inputs;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

/// Mutex flavour for queues shared between executor tasks.
#[cfg(target_os = "none")]
pub type BoardMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
pub type BoardMutex = NoopRawMutex;

#[cfg(target_os = "none")]
pub use self::platform::FirmwarePlatform;

#[cfg(target_os = "none")]
mod platform {
    use ecu_core::node::Platform;

    use super::can::QueuedBus;
    use super::flash::FlashStorage;
    use super::inputs::BoardInputs;
    use super::leds::PatternLeds;
    use super::uart::UartConsole;

    /// Collaborators of the STM32G0 board.
    pub struct FirmwarePlatform;

    impl Platform for FirmwarePlatform {
        type Storage = FlashStorage;
        type Bus = QueuedBus<'static>;
        type Indicators = PatternLeds<'static>;
        type Console = UartConsole<'static>;
        type Inputs = BoardInputs;
    }
}
