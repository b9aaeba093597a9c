//! Battery voltage through ADC1.

use esp_hal::{
    Blocking,
    analog::adc::{Adc, AdcCalCurve, AdcChannel, AdcConfig, AdcPin, Attenuation},
    gpio::AnalogPin,
    peripherals::ADC1,
};
use wakeclock_core::power::BatteryCurve;

/// Ratio of the resistor divider between the cell and the ADC pin.
const DIVIDER_RATIO: u32 = 2;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BatteryError {
    Adc,
}

/// Cell voltage sensed on an ADC1 pin behind a 1:2 divider.
pub struct AdcBattery<'d, PIN> {
    adc: Adc<'d, ADC1<'d>, Blocking>,
    pin: AdcPin<PIN, ADC1<'d>, AdcCalCurve<ADC1<'d>>>,
    curve: BatteryCurve,
}

impl<'d, PIN> AdcBattery<'d, PIN>
where
    PIN: AdcChannel + AnalogPin,
{
    pub fn new(adc1: ADC1<'d>, pin: PIN, curve: BatteryCurve) -> Self {
        let mut config = AdcConfig::new();
        let pin = config.enable_pin_with_cal::<_, AdcCalCurve<ADC1<'d>>>(pin, Attenuation::_11dB);
        let adc = Adc::new(adc1, config);

        Self { adc, pin, curve }
    }

    pub fn millivolts(&mut self) -> Result<u32, BatteryError> {
        let pin_mv = nb::block!(self.adc.read_oneshot(&mut self.pin)).map_err(|_| BatteryError::Adc)?;
        Ok(pin_mv as u32 * DIVIDER_RATIO)
    }

    pub fn percent(&mut self) -> Result<i16, BatteryError> {
        let mv = self.millivolts()?;
        Ok(self.curve.percent(mv))
    }
}
