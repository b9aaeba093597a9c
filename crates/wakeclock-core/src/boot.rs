//! One wake cycle: optional sync, render, arm the button, sleep.

use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

use crate::{
    power::{Power, WakeSource},
    render::{ClockFace, ClockReading, Display},
    sync::{CancelToken, Network, SyncConfig, SyncError, SyncReport, TimeSync},
    time::{DateTime, TimeSource, Zone},
};

/// GPIO wired to the wake button on the reference board.
pub const WAKE_BUTTON_GPIO: u8 = 12;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootReason {
    /// Power-on or reset; the clock may be unset.
    ColdBoot,
    /// Woken from deep sleep by the armed button.
    InterruptWake,
}

impl BootReason {
    pub const fn from_wake(woke_from_deep_sleep: bool) -> Self {
        if woke_from_deep_sleep {
            BootReason::InterruptWake
        } else {
            BootReason::ColdBoot
        }
    }
}

#[derive(Clone, Debug)]
pub struct BootConfig<'a> {
    pub sync: SyncConfig,
    pub face: ClockFace<'a>,
    pub wake: WakeSource,
    pub inverted: bool,
}

impl Default for BootConfig<'static> {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            face: ClockFace::default(),
            wake: WakeSource::button(WAKE_BUTTON_GPIO),
            inverted: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncOutcome<E> {
    Skipped,
    Synced(SyncReport),
    Failed(SyncError<E>),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CycleReport<E> {
    pub reason: BootReason,
    pub sync: SyncOutcome<E>,
    pub reading: ClockReading,
}

/// Parses a POSIX TZ rule, falling back to UTC when it is rejected.
pub fn resolve_zone(rule: &str) -> Zone {
    Zone::posix(rule).unwrap_or_else(|err| {
        warn!("boot: timezone {:?} rejected ({:?}), using UTC", rule, err);
        Zone::utc()
    })
}

/// Owns every capability for the lifetime of one boot.
pub struct BootController<'a, T, N, D, P, W> {
    clock: T,
    network: Option<N>,
    display: D,
    power: P,
    delay: W,
    config: BootConfig<'a>,
    zone: Zone,
    cancel: &'a CancelToken,
}

impl<'a, T, N, D, P, W> BootController<'a, T, N, D, P, W>
where
    T: TimeSource,
    N: Network,
    D: Display,
    P: Power,
    W: DelayNs,
{
    /// `network` may be `None` when the radio was never brought up.
    pub fn new(
        clock: T,
        network: Option<N>,
        display: D,
        power: P,
        delay: W,
        config: BootConfig<'a>,
        cancel: &'a CancelToken,
    ) -> Self {
        let zone = resolve_zone(&config.sync.timezone);

        Self {
            clock,
            network,
            display,
            power,
            delay,
            config,
            zone,
            cancel,
        }
    }

    /// Everything up to, but not including, deep sleep.
    pub async fn run_cycle(&mut self, reason: BootReason) -> CycleReport<N::Error> {
        info!("boot: {:?}", reason);
        self.display.set_inverted(self.config.inverted);

        let sync = match (reason, self.network.as_mut()) {
            (BootReason::InterruptWake, _) => SyncOutcome::Skipped,
            (BootReason::ColdBoot, None) => {
                warn!("boot: no network available, clock left as is");
                SyncOutcome::Skipped
            }
            (BootReason::ColdBoot, Some(network)) => {
                let sync = TimeSync::new(&self.config.sync, &self.zone, self.cancel);
                match sync
                    .run(network, &mut self.clock, &mut self.display, &mut self.delay)
                    .await
                {
                    Ok(report) => SyncOutcome::Synced(report),
                    Err(err) => {
                        warn!("boot: time sync failed: {:?}", err);
                        SyncOutcome::Failed(err)
                    }
                }
            }
        };

        let reading = self.read();
        let (width, height) = self.display.size();
        let canvas = self.config.face.render(width, height, &reading);
        if let Err(err) = self.display.present(&canvas) {
            warn!("boot: present failed: {:?}", err);
        }

        if let Err(err) = self.power.arm_wake(self.config.wake) {
            warn!("boot: arming wake source failed: {:?}", err);
        }

        CycleReport {
            reason,
            sync,
            reading,
        }
    }

    /// Runs the cycle and powers down. Execution resumes at reset.
    pub async fn run(mut self, reason: BootReason) -> ! {
        let report = self.run_cycle(reason).await;
        info!(
            "boot: showing {:?}, battery {}%, sleeping",
            report.reading.now, report.reading.battery_percent
        );
        self.sleep()
    }

    pub fn sleep(mut self) -> ! {
        self.power.deep_sleep()
    }

    fn read(&mut self) -> ClockReading {
        let now = self.clock.read().unwrap_or_else(|err| {
            warn!("boot: clock read failed: {:?}", err);
            DateTime::default()
        });
        let battery_percent = self.power.battery_level().unwrap_or_else(|err| {
            warn!("boot: battery read failed: {:?}", err);
            -1
        });

        ClockReading {
            now,
            battery_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::{
        power::WakeLevel,
        sync::Stage,
        testing::{MockClock, MockDelay, MockDisplay, MockError, MockNetwork, MockPower},
    };

    const NOW: u64 = 1_709_769_900;

    type Controller<'a> =
        BootController<'a, MockClock, MockNetwork, MockDisplay, MockPower, MockDelay>;

    fn controller<'a>(
        network: Option<MockNetwork>,
        config: BootConfig<'static>,
        cancel: &'a CancelToken,
    ) -> Controller<'a> {
        BootController::new(
            MockClock::new(DateTime::new(2023, 12, 31, 23, 59, 58)),
            network,
            MockDisplay::new(400, 240),
            MockPower::new(Ok(83)),
            MockDelay::default(),
            config,
            cancel,
        )
    }

    #[test]
    fn reason_from_wake_flag() {
        assert_eq!(BootReason::from_wake(false), BootReason::ColdBoot);
        assert_eq!(BootReason::from_wake(true), BootReason::InterruptWake);
    }

    #[test]
    fn interrupt_wake_never_touches_network() {
        let cancel = CancelToken::new();
        let mut boot = controller(
            Some(MockNetwork::connected(NOW)),
            BootConfig::default(),
            &cancel,
        );

        let report = block_on(boot.run_cycle(BootReason::InterruptWake));

        assert_eq!(report.sync, SyncOutcome::Skipped);
        assert!(!boot.network.as_ref().unwrap().touched());
        assert!(boot.clock.writes.is_empty());
        assert_eq!(boot.power.armed, [WakeSource::button(12)]);
        assert_eq!(boot.display.frames.len(), 1);
        assert!(boot.display.inverted);
        assert_eq!(report.reading.now, DateTime::new(2023, 12, 31, 23, 59, 58));
        assert_eq!(report.reading.battery_percent, 83);
    }

    #[test]
    fn cold_boot_syncs_then_renders_fresh_time() {
        let cancel = CancelToken::new();
        let mut boot = controller(
            Some(MockNetwork::connected(NOW)),
            BootConfig::default(),
            &cancel,
        );

        let report = block_on(boot.run_cycle(BootReason::ColdBoot));

        let SyncOutcome::Synced(sync) = report.sync else {
            panic!("expected a sync, got {:?}", report.sync);
        };
        assert!(!sync.provisioned);
        assert_eq!(boot.network.as_ref().unwrap().provisioning_calls, 0);
        assert_eq!(report.reading.now, DateTime::new(2024, 3, 7, 9, 5, 0));

        let face = boot.display.frames.last().unwrap();
        let expected = BootConfig::default().face.render(400, 240, &report.reading);
        assert_eq!(face, &expected);
    }

    #[test]
    fn failed_sync_still_renders_and_arms() {
        let cancel = CancelToken::new();
        let config = BootConfig {
            sync: SyncConfig::default().with_deadline(core::time::Duration::from_secs(1)),
            ..BootConfig::default()
        };
        let mut boot = controller(Some(MockNetwork::new(NOW)), config, &cancel);

        let report = block_on(boot.run_cycle(BootReason::ColdBoot));

        assert_eq!(
            report.sync,
            SyncOutcome::Failed(SyncError::TimedOut(Stage::Provisioning))
        );
        assert_eq!(boot.network.as_ref().unwrap().provisioning_calls, 1);
        assert!(boot.clock.writes.is_empty());
        assert_eq!(boot.power.armed.len(), 1);
        assert_eq!(report.reading.now, DateTime::new(2023, 12, 31, 23, 59, 58));
    }

    #[test]
    fn cold_boot_without_network_skips_sync() {
        let cancel = CancelToken::new();
        let mut boot = controller(None, BootConfig::default(), &cancel);

        let report = block_on(boot.run_cycle(BootReason::ColdBoot));

        assert_eq!(report.sync, SyncOutcome::Skipped);
        assert_eq!(boot.power.armed.len(), 1);
    }

    #[test]
    fn failed_reads_render_defaults() {
        let cancel = CancelToken::new();
        let mut boot = controller(None, BootConfig::default(), &cancel);
        boot.clock.fail_reads = true;
        boot.power.battery = Err(MockError);

        let report = block_on(boot.run_cycle(BootReason::InterruptWake));

        assert_eq!(report.reading.now, DateTime::default());
        assert_eq!(report.reading.battery_percent, -1);
        assert_eq!(boot.display.frames.len(), 1);
    }

    #[test]
    fn configured_wake_source_is_armed_once() {
        let cancel = CancelToken::new();
        let wake = WakeSource {
            gpio: 33,
            level: WakeLevel::Low,
            pull_up: true,
        };
        let config = BootConfig {
            wake,
            ..BootConfig::default()
        };
        let mut boot = controller(None, config, &cancel);

        block_on(boot.run_cycle(BootReason::InterruptWake));

        assert_eq!(boot.power.armed, [wake]);
    }

    #[test]
    fn bad_timezone_falls_back_to_utc() {
        let cancel = CancelToken::new();
        let mut config = BootConfig::default();
        config.sync.timezone.clear();
        config.sync.timezone.push_str("??").unwrap();
        let mut boot = controller(Some(MockNetwork::connected(NOW)), config, &cancel);

        let report = block_on(boot.run_cycle(BootReason::ColdBoot));

        assert_eq!(report.reading.now, DateTime::new(2024, 3, 7, 0, 5, 0));
    }
}
