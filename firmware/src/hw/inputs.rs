//! ADC sensors and the two operator buttons.

use ecu_core::inputs::{AdcScale, Buttons, Sensors};
use embassy_stm32::adc::{Adc, AnyAdcChannel, SampleTime};
use embassy_stm32::gpio::Input;
use embassy_stm32::peripherals::ADC1;

pub struct BoardInputs {
    adc: Adc<'static, ADC1>,
    temperature: AnyAdcChannel<ADC1>,
    voltage: AnyAdcChannel<ADC1>,
    left: Input<'static>,
    right: Input<'static>,
}

impl BoardInputs {
    /// Buttons are wired active-low with pull-ups.
    pub fn new(
        mut adc: Adc<'static, ADC1>,
        temperature: AnyAdcChannel<ADC1>,
        voltage: AnyAdcChannel<ADC1>,
        left: Input<'static>,
        right: Input<'static>,
    ) -> Self {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        Self {
            adc,
            temperature,
            voltage,
            left,
            right,
        }
    }
}

// Conversions block on the ADC end-of-conversion flag; a hung converter
// stalls the node loop and the watchdog task lets the IWDG reset the board.
impl Sensors for BoardInputs {
    fn read_temperature(&mut self) -> u8 {
        AdcScale::TEMPERATURE.map(self.adc.blocking_read(&mut self.temperature))
    }

    fn read_voltage(&mut self) -> u8 {
        AdcScale::VOLTAGE.map(self.adc.blocking_read(&mut self.voltage))
    }
}

impl Buttons for BoardInputs {
    fn left(&mut self) -> bool {
        self.left.is_low()
    }

    fn right(&mut self) -> bool {
        self.right.is_low()
    }
}
