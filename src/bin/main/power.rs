use esp_hal::{
    analog::adc::AdcChannel,
    gpio::{AnalogPin, RtcPin, RtcPinWithResistors},
    peripherals::{GPIO2, GPIO12, LPWR},
    rtc_cntl::{
        Rtc,
        sleep::{RtcioWakeupSource, WakeupLevel},
    },
};
use log::{info, warn};
use wakeclock_core::{
    boot::WAKE_BUTTON_GPIO,
    power::{Power, WakeLevel, WakeSource},
};
use wakeclock_hal_esp32s3::platform::battery::{AdcBattery, BatteryError};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(super) enum PowerError {
    Battery(BatteryError),
    /// Only the button pin is routed to an RTC wake input.
    UnsupportedWakePin(u8),
}

pub(super) struct BoardPower<'d, PIN> {
    battery: AdcBattery<'d, PIN>,
    wake: Option<WakeSource>,
}

impl<'d, PIN> BoardPower<'d, PIN> {
    pub(super) fn new(battery: AdcBattery<'d, PIN>) -> Self {
        Self {
            battery,
            wake: None,
        }
    }
}

impl<PIN> Power for BoardPower<'_, PIN>
where
    PIN: AdcChannel + AnalogPin,
{
    type Error = PowerError;

    fn battery_level(&mut self) -> Result<i16, Self::Error> {
        self.battery.percent().map_err(PowerError::Battery)
    }

    fn arm_wake(&mut self, source: WakeSource) -> Result<(), Self::Error> {
        if source.gpio != WAKE_BUTTON_GPIO {
            return Err(PowerError::UnsupportedWakePin(source.gpio));
        }
        self.wake = Some(source);
        Ok(())
    }

    fn deep_sleep(&mut self) -> ! {
        let wake = self.wake.unwrap_or_else(|| {
            warn!("power: no wake source armed, using the button");
            WakeSource::button(WAKE_BUTTON_GPIO)
        });

        // Latch DISP high so the panel keeps showing the last frame.
        let disp_hold = unsafe { GPIO2::steal() };
        disp_hold.rtcio_pad_hold(true);

        let mut rtc = Rtc::new(unsafe { LPWR::steal() });
        let mut wake_sw = unsafe { GPIO12::steal() };
        wake_sw.rtcio_pullup(wake.pull_up);

        let level = match wake.level {
            WakeLevel::Low => WakeupLevel::Low,
            WakeLevel::High => WakeupLevel::High,
        };
        let mut wake_pins: [(&mut dyn RtcPin, WakeupLevel); 1] = [(&mut wake_sw, level)];
        let wake_source = RtcioWakeupSource::new(&mut wake_pins);

        info!("power: deep sleep, wake on GPIO{} {:?}", wake.gpio, wake.level);
        rtc.sleep_deep(&[&wake_source]);
    }
}
