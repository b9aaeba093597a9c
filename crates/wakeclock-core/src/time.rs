//! Civil date-time model, the clock capability and timezone conversion.

use jiff::{
    Timestamp,
    civil,
    tz::TimeZone,
};

/// Local wall-clock reading as shown on screen.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }
}

/// Real-time clock (or host clock) holding local time.
pub trait TimeSource {
    type Error: core::fmt::Debug;

    fn read(&mut self) -> Result<DateTime, Self::Error>;
    fn write(&mut self, now: DateTime) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimeError {
    /// Timezone rule could not be parsed.
    InvalidZone,
    /// Timestamp or civil fields outside the supported calendar range.
    OutOfRange,
}

/// Timezone rule applied between UTC seconds and local [`DateTime`].
#[derive(Clone, Debug)]
pub struct Zone {
    tz: TimeZone,
}

impl Zone {
    /// Parses a POSIX TZ rule such as `JST-9` or `CET-1CEST,M3.5.0,M10.5.0/3`.
    pub fn posix(rule: &str) -> Result<Self, TimeError> {
        let tz = TimeZone::posix(rule).map_err(|_| TimeError::InvalidZone)?;
        Ok(Self { tz })
    }

    pub fn utc() -> Self {
        Self { tz: TimeZone::UTC }
    }

    pub fn local_from_unix(&self, unix_secs: i64) -> Result<DateTime, TimeError> {
        let ts = Timestamp::from_second(unix_secs).map_err(|_| TimeError::OutOfRange)?;
        let dt = self.tz.to_datetime(ts);

        // jiff years may be negative or exceed four digits; the display cannot.
        let year = u16::try_from(dt.year()).map_err(|_| TimeError::OutOfRange)?;
        Ok(DateTime {
            year,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        })
    }

    pub fn unix_from_local(&self, local: DateTime) -> Result<i64, TimeError> {
        let year = i16::try_from(local.year).map_err(|_| TimeError::OutOfRange)?;
        let dt = civil::DateTime::new(
            year,
            local.month as i8,
            local.day as i8,
            local.hour as i8,
            local.minute as i8,
            local.second as i8,
            0,
        )
        .map_err(|_| TimeError::OutOfRange)?;

        let ts = self.tz.to_timestamp(dt).map_err(|_| TimeError::OutOfRange)?;
        Ok(ts.as_second())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_offset_rule_shifts_epoch() {
        let zone = Zone::posix("JST-9").unwrap();
        assert_eq!(
            zone.local_from_unix(0).unwrap(),
            DateTime::new(1970, 1, 1, 9, 0, 0)
        );
    }

    #[test]
    fn local_to_unix_inverts_conversion() {
        let zone = Zone::posix("JST-9").unwrap();
        let local = DateTime::new(2024, 3, 7, 9, 5, 0);
        let unix = zone.unix_from_local(local).unwrap();

        assert_eq!(unix, 1_709_769_900);
        assert_eq!(zone.local_from_unix(unix).unwrap(), local);
    }

    #[test]
    fn utc_zone_is_identity() {
        let zone = Zone::utc();
        assert_eq!(
            zone.local_from_unix(86_400 + 3_661).unwrap(),
            DateTime::new(1970, 1, 2, 1, 1, 1)
        );
    }

    #[test]
    fn garbage_rule_is_rejected() {
        assert_eq!(Zone::posix("not a zone").unwrap_err(), TimeError::InvalidZone);
    }

    #[test]
    fn invalid_civil_fields_are_rejected() {
        let zone = Zone::utc();
        let bogus = DateTime::new(2024, 13, 40, 0, 0, 0);
        assert_eq!(zone.unix_from_local(bogus).unwrap_err(), TimeError::OutOfRange);
    }
}
