//! Simulator knobs, read from the environment.

use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};
use wakeclock_core::credentials::WifiCredentials;

use crate::network::NtpSource;

/// Set by the sleeping process when it relaunches itself as the woken chip.
pub const WAKE_ENV: &str = "WAKECLOCK_WAKE";
pub const CLOCK_OFFSET_ENV: &str = "WAKECLOCK_CLOCK_OFFSET";
pub const SSID_ENV: &str = "WAKECLOCK_SSID";
pub const PASSWORD_ENV: &str = "WAKECLOCK_PASSWORD";
const TZ_ENV: &str = "WAKECLOCK_TZ";
const AP_SSID_ENV: &str = "WAKECLOCK_AP_SSID";
const AP_PASSWORD_ENV: &str = "WAKECLOCK_AP_PASSWORD";
const PROVISION_SSID_ENV: &str = "WAKECLOCK_PROVISION_SSID";
const PROVISION_PASSWORD_ENV: &str = "WAKECLOCK_PROVISION_PASSWORD";
const BATTERY_ENV: &str = "WAKECLOCK_BATTERY_MV";
const NTP_FIXED_ENV: &str = "WAKECLOCK_NTP_FIXED";
const DEADLINE_ENV: &str = "WAKECLOCK_SYNC_DEADLINE_SECS";

const DEFAULT_AP: (&str, &str) = ("sim-ap", "sim-pass");
const DEFAULT_BATTERY_MV: u32 = 3_900;

#[derive(Debug)]
pub struct Settings {
    pub woke: bool,
    pub timezone: Option<String>,
    /// `None` means the RTC was never set.
    pub clock_offset: Option<i64>,
    pub stored: Option<WifiCredentials>,
    pub access_point: WifiCredentials,
    pub phone: Option<WifiCredentials>,
    pub battery_mv: u32,
    pub ntp: NtpSource,
    pub sync_deadline: Option<Duration>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let parse = |name: &str| parse_var::<u64>(&lookup, name);

        let access_point = credentials(&lookup, AP_SSID_ENV, AP_PASSWORD_ENV)?
            .map_or_else(|| creds(DEFAULT_AP.0, DEFAULT_AP.1), Ok)?;

        Ok(Self {
            woke: lookup(WAKE_ENV).is_some_and(|value| value == "1"),
            timezone: lookup(TZ_ENV),
            clock_offset: parse_var(&lookup, CLOCK_OFFSET_ENV)?,
            stored: credentials(&lookup, SSID_ENV, PASSWORD_ENV)?,
            access_point,
            phone: credentials(&lookup, PROVISION_SSID_ENV, PROVISION_PASSWORD_ENV)?,
            battery_mv: parse_var(&lookup, BATTERY_ENV)?.unwrap_or(DEFAULT_BATTERY_MV),
            ntp: parse(NTP_FIXED_ENV)?.map_or(NtpSource::Udp, NtpSource::Fixed),
            sync_deadline: parse(DEADLINE_ENV)?.map(Duration::from_secs),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|value| value.parse::<T>().with_context(|| format!("{name}={value:?}")))
        .transpose()
}

fn creds(ssid: &str, password: &str) -> Result<WifiCredentials> {
    WifiCredentials::new(ssid, password).map_err(|err| anyhow!("credentials for {ssid:?}: {err:?}"))
}

/// An SSID alone means an open network.
fn credentials(
    lookup: &impl Fn(&str) -> Option<String>,
    ssid_name: &str,
    password_name: &str,
) -> Result<Option<WifiCredentials>> {
    let Some(ssid) = lookup(ssid_name) else {
        return Ok(None);
    };
    let password = lookup(password_name).unwrap_or_default();
    creds(&ssid, &password).map(Some)
}
