//! Host stand-ins for the RTC, power management and delays.

use std::{
    cell::RefCell,
    io::BufRead,
    process::Command,
    rc::Rc,
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};
use wakeclock_core::{
    credentials::{CredentialStore, MemoryCredentialStore},
    power::{BatteryCurve, Power, WakeSource},
    time::{DateTime, TimeError, TimeSource, Zone},
};

use crate::settings::{CLOCK_OFFSET_ENV, PASSWORD_ENV, SSID_ENV, WAKE_ENV};

/// State that survives a simulated deep sleep, like RTC memory and flash.
#[derive(Debug, Default)]
pub struct Retained {
    /// Seconds added to the host clock.
    pub clock_offset: i64,
    pub store: MemoryCredentialStore,
}

pub type Shared = Rc<RefCell<Retained>>;

fn host_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// Offset that makes the clock read the epoch now, as an unset RTC would.
pub fn unset_clock_offset() -> i64 {
    -host_unix()
}

pub struct HostClock {
    retained: Shared,
    zone: Zone,
}

impl HostClock {
    pub fn new(retained: Shared, zone: Zone) -> Self {
        Self { retained, zone }
    }

    fn unix(&self) -> i64 {
        host_unix() + self.retained.borrow().clock_offset
    }
}

impl TimeSource for HostClock {
    type Error = TimeError;

    fn read(&mut self) -> Result<DateTime, Self::Error> {
        self.zone.local_from_unix(self.unix())
    }

    fn write(&mut self, now: DateTime) -> Result<(), Self::Error> {
        let unix = self.zone.unix_from_local(now)?;
        self.retained.borrow_mut().clock_offset = unix - host_unix();
        info!("sim: clock set to {:?}", now);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HostDelay;

impl DelayNs for HostDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }

    async fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// Battery at a fixed voltage; deep sleep waits for Enter on stdin.
pub struct SimPower {
    retained: Shared,
    battery_mv: u32,
    curve: BatteryCurve,
    armed: Option<WakeSource>,
}

impl SimPower {
    pub fn new(retained: Shared, battery_mv: u32) -> Self {
        Self {
            retained,
            battery_mv,
            curve: BatteryCurve::default(),
            armed: None,
        }
    }

    /// Environment for the process that plays the woken chip.
    fn wake_command(&self) -> std::io::Result<Command> {
        let mut command = Command::new(std::env::current_exe()?);
        command
            .args(std::env::args_os().skip(1))
            .env(WAKE_ENV, "1");

        let mut retained = self.retained.borrow_mut();
        command.env(CLOCK_OFFSET_ENV, retained.clock_offset.to_string());
        match retained.store.load() {
            Ok(Some(creds)) => {
                command
                    .env(SSID_ENV, creds.ssid.as_str())
                    .env(PASSWORD_ENV, creds.password.as_str());
            }
            Ok(None) => {}
            Err(err) => warn!("sim: stored credentials unreadable: {:?}", err),
        }
        Ok(command)
    }
}

impl Power for SimPower {
    type Error = core::convert::Infallible;

    fn battery_level(&mut self) -> Result<i16, Self::Error> {
        Ok(self.curve.percent(self.battery_mv))
    }

    fn arm_wake(&mut self, source: WakeSource) -> Result<(), Self::Error> {
        self.armed = Some(source);
        Ok(())
    }

    fn deep_sleep(&mut self) -> ! {
        let Some(source) = self.armed else {
            warn!("sim: no wake source armed, powering off");
            std::process::exit(0);
        };

        info!(
            "sim: deep sleep; press Enter to trigger GPIO{} ({:?})",
            source.gpio, source.level
        );
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => {
                info!("sim: stdin closed, powering off");
                std::process::exit(0);
            }
            Ok(_) => {}
        }

        let err = match self.wake_command() {
            Ok(command) => relaunch(command),
            Err(err) => err,
        };
        error!("sim: wake failed: {}", err);
        std::process::exit(1);
    }
}

/// Replaces this process with the woken one; returns only on failure.
#[cfg(unix)]
fn relaunch(mut command: Command) -> std::io::Error {
    use std::os::unix::process::CommandExt;

    command.exec()
}

#[cfg(not(unix))]
fn relaunch(mut command: Command) -> std::io::Error {
    match command.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(err) => err,
    }
}
