//! Wall clock kept in the SoC RTC across deep sleep.

use esp_hal::rtc_cntl::Rtc;
use log::info;
use wakeclock_core::time::{DateTime, TimeError, TimeSource, Zone};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RtcClockError {
    Time(TimeError),
    /// Local time maps to an instant before 1970.
    BeforeEpoch,
}

/// SoC RTC counter holding UTC microseconds; keeps running in deep sleep.
pub struct RtcClock<'d> {
    rtc: Rtc<'d>,
    zone: Zone,
}

impl<'d> RtcClock<'d> {
    pub fn new(rtc: Rtc<'d>, zone: Zone) -> Self {
        Self { rtc, zone }
    }

    pub fn unix_secs(&self) -> u64 {
        self.rtc.current_time_us() / 1_000_000
    }
}

impl TimeSource for RtcClock<'_> {
    type Error = RtcClockError;

    fn read(&mut self) -> Result<DateTime, Self::Error> {
        self.zone
            .local_from_unix(self.unix_secs() as i64)
            .map_err(RtcClockError::Time)
    }

    fn write(&mut self, now: DateTime) -> Result<(), Self::Error> {
        let unix = self
            .zone
            .unix_from_local(now)
            .map_err(RtcClockError::Time)?;
        let unix = u64::try_from(unix).map_err(|_| RtcClockError::BeforeEpoch)?;

        self.rtc.set_current_time_us(unix * 1_000_000);
        info!("rtc: set to {:?} (unix {})", now, unix);
        Ok(())
    }
}
