//! Sensor and button collaborators.

/// Full-scale reading of the 12-bit ADC.
pub const ADC_MAX: u16 = 4095;

/// Linear mapping of a bounded raw ADC sample onto an engineering range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AdcScale {
    pub raw_max: u16,
    pub low: u8,
    pub high: u8,
}

impl AdcScale {
    /// Temperature channel, 0–40 °C.
    pub const TEMPERATURE: Self = Self::new(ADC_MAX, 0, 40);
    /// Supply-sense channel, 0–3 V.
    pub const VOLTAGE: Self = Self::new(ADC_MAX, 0, 3);

    #[must_use]
    pub const fn new(raw_max: u16, low: u8, high: u8) -> Self {
        Self { raw_max, low, high }
    }

    /// Maps `raw` into the range, truncating toward `low`. Samples above
    /// `raw_max` clamp to `high`.
    #[must_use]
    #[allow(clippy::cast_lossless, clippy::cast_possible_truncation)]
    pub const fn map(self, raw: u16) -> u8 {
        if self.raw_max == 0 {
            return self.low;
        }
        let raw = if raw > self.raw_max { self.raw_max } else { raw };
        let span = (self.high - self.low) as u32;
        let scaled = (raw as u32 * span) / self.raw_max as u32;
        // `scaled <= span <= u8::MAX`
        self.low + scaled as u8
    }
}

/// Analog sensors read by the node tasks.
pub trait Sensors {
    /// Current temperature in °C.
    fn read_temperature(&mut self) -> u8;
    /// Current supply voltage class in volts.
    fn read_voltage(&mut self) -> u8;
}

/// Operator buttons, `true` while held.
pub trait Buttons {
    fn left(&mut self) -> bool;
    fn right(&mut self) -> bool;

    /// Both buttons held together.
    fn chord(&mut self) -> bool {
        self.left() && self.right()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_scale_is_linear_and_clamped() {
        let scale = AdcScale::TEMPERATURE;
        assert_eq!(scale.map(0), 0);
        assert_eq!(scale.map(2048), 20);
        assert_eq!(scale.map(ADC_MAX), 40);
        assert_eq!(scale.map(u16::MAX), 40);
    }

    #[test]
    fn voltage_scale_truncates() {
        let scale = AdcScale::VOLTAGE;
        assert_eq!(scale.map(4094), 2);
        assert_eq!(scale.map(ADC_MAX), 3);
    }
}
