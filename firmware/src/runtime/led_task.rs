use ecu_core::presentation::Led;
use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Ticker};

use crate::hw::leds::LedPatterns;

/// Half period of the blink pattern.
const BLINK_PHASE: Duration = Duration::from_millis(250);

/// Pins in [`Led::ALL`] order.
#[embassy_executor::task]
pub async fn run(patterns: &'static LedPatterns, mut pins: [Output<'static>; 4]) -> ! {
    let mut ticker = Ticker::every(BLINK_PHASE);
    let mut phase = true;
    loop {
        for (led, pin) in Led::ALL.into_iter().zip(pins.iter_mut()) {
            if patterns.level(led, phase) {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
        phase = !phase;
        ticker.next().await;
    }
}
