use embassy_stm32::peripherals::IWDG;
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_time::{Duration, Ticker};

use crate::hw::watchdog::{PassCounter, ProgressCheck};

/// Reset delay of the IWDG once it stops being petted.
pub const TIMEOUT: Duration = Duration::from_millis(500);
/// How often the node loop's progress is checked.
const CHECK_PERIOD: Duration = Duration::from_millis(100);

#[embassy_executor::task]
pub async fn run(mut watchdog: IndependentWatchdog<'static, IWDG>, passes: &'static PassCounter) -> ! {
    let mut check = ProgressCheck::new();
    let mut ticker = Ticker::every(CHECK_PERIOD);
    watchdog.unleash();
    defmt::info!("watchdog: armed, {=u64} ms timeout", TIMEOUT.as_millis());
    loop {
        ticker.next().await;
        if check.advanced(passes) {
            watchdog.pet();
        } else {
            defmt::warn!("watchdog: node loop stalled");
        }
    }
}
