use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use static_cell::StaticCell;

use crate::hw::uart::{CONSOLE_FRAME_SIZE, CONSOLE_QUEUE_DEPTH, ConsoleQueue};

const UART_BUFFER_SIZE: usize = CONSOLE_FRAME_SIZE * CONSOLE_QUEUE_DEPTH;
const CONSOLE_BAUD: u32 = 115_200;

static UART_TX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART2_LPUART2 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART2>;
});

#[embassy_executor::task]
pub async fn run(
    queue: &'static ConsoleQueue,
    usart: Peri<'static, hal::peripherals::USART2>,
    tx_pin: Peri<'static, hal::peripherals::PA2>,
    rx_pin: Peri<'static, hal::peripherals::PA3>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = CONSOLE_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UartIrqs,
        config,
    )
    .expect("failed to initialize console UART");

    let (mut uart_tx, mut uart_rx) = uart.split();
    let frames = queue.outbound_receiver();
    let input = queue.inbound_sender();

    let to_uart = async move {
        loop {
            let frame = frames.receive().await;
            if uart_tx.write_all(&frame).await.is_err() {
                defmt::warn!("console: UART write error");
                Timer::after(Duration::from_millis(5)).await;
                continue;
            }
            if uart_tx.flush().await.is_err() {
                defmt::warn!("console: UART flush error");
                Timer::after(Duration::from_millis(5)).await;
            }
        }
    };

    let from_uart = async move {
        let mut ingress = [0u8; CONSOLE_FRAME_SIZE];
        loop {
            match uart_rx.read(&mut ingress).await {
                Ok(count) => {
                    for &byte in &ingress[..count] {
                        input.send(byte).await;
                    }
                }
                Err(_) => {
                    defmt::warn!("console: UART read error");
                    Timer::after(Duration::from_millis(5)).await;
                }
            }
        }
    };

    join(to_uart, from_uart).await;
    loop {
        core::future::pending::<()>().await;
    }
}
