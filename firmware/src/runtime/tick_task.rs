use ecu_core::ticks::TickCounters;
use embassy_time::{Duration, Ticker};

/// One scheduler tick.
const TICK_PERIOD: Duration = Duration::from_millis(1);

#[embassy_executor::task]
pub async fn run(ticks: &'static TickCounters) -> ! {
    let mut ticker = Ticker::every(TICK_PERIOD);
    loop {
        ticker.next().await;
        ticks.on_tick();
    }
}
