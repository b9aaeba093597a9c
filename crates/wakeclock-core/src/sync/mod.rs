//! Cold-boot network time sync.
//!
//! Join with stored credentials, fall back to broadcast provisioning, query
//! the time servers and write local time into the clock. Progress is printed
//! to a [`StatusConsole`] the way a serial terminal would show it.

pub mod ntp;

use core::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use embedded_hal_async::delay::DelayNs;
use heapless::String;
use log::{debug, info, warn};

use crate::{
    render::{Display, StatusConsole, TextSize},
    time::{DateTime, TimeError, TimeSource, Zone},
};

pub const DEFAULT_TIMEZONE: &str = "JST-9";
pub const DEFAULT_SERVERS: [&str; 3] = ["ntp.nict.jp", "time.google.com", "ntp.jst.mfeed.ad.jp"];

/// Station-side network capability.
pub trait Network {
    type Error: core::fmt::Debug;

    /// Starts joining with stored credentials. Does not wait for the link.
    async fn begin(&mut self) -> Result<(), Self::Error>;
    async fn is_connected(&mut self) -> bool;
    /// Starts listening for broadcast provisioning.
    async fn begin_provisioning(&mut self) -> Result<(), Self::Error>;
    /// True once credentials were received; the join is already under way.
    async fn provisioning_done(&mut self) -> bool;
    /// Unix seconds reported by `server`.
    async fn query_time(&mut self, server: &str) -> Result<u64, Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Join,
    Provisioning,
    Reconnect,
    TimeQuery,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncError<E> {
    Cancelled(Stage),
    TimedOut(Stage),
    Network(E),
    Clock,
    Time(TimeError),
    Display,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SyncReport {
    /// Credentials came from broadcast provisioning in this run.
    pub provisioned: bool,
    pub server: &'static str,
    pub unix_secs: u64,
    pub local: DateTime,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// POSIX TZ rule applied before writing the clock.
    pub timezone: String<48>,
    pub servers: [&'static str; 3],
    pub join_timeout: Duration,
    pub join_poll: Duration,
    pub provisioning_poll: Duration,
    pub provisioning_deadline: Option<Duration>,
    pub reconnect_poll: Duration,
    pub reconnect_deadline: Option<Duration>,
    pub time_poll: Duration,
    pub time_deadline: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let mut timezone = String::new();
        let _ = timezone.push_str(DEFAULT_TIMEZONE);

        Self {
            timezone,
            servers: DEFAULT_SERVERS,
            join_timeout: Duration::from_secs(5),
            join_poll: Duration::from_millis(500),
            provisioning_poll: Duration::from_millis(500),
            provisioning_deadline: None,
            reconnect_poll: Duration::from_millis(500),
            reconnect_deadline: None,
            time_poll: Duration::from_secs(1),
            time_deadline: None,
        }
    }
}

impl SyncConfig {
    /// Bounds every otherwise open-ended wait by `limit`.
    pub fn with_deadline(mut self, limit: Duration) -> Self {
        self.provisioning_deadline = Some(limit);
        self.reconnect_deadline = Some(limit);
        self.time_deadline = Some(limit);
        self
    }
}

/// Shared flag that aborts any sync wait at its next poll.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Poll pacing for one stage. Time is the sum of the delays taken.
struct Wait {
    stage: Stage,
    poll: Duration,
    limit: Option<Duration>,
    spent: Duration,
}

impl Wait {
    fn new(stage: Stage, poll: Duration, limit: Option<Duration>) -> Self {
        Self {
            stage,
            poll,
            limit,
            spent: Duration::ZERO,
        }
    }

    fn expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.spent >= limit)
    }
}

/// One run of the sync sequence.
pub struct TimeSync<'a> {
    config: &'a SyncConfig,
    zone: &'a Zone,
    cancel: &'a CancelToken,
}

impl<'a> TimeSync<'a> {
    pub fn new(config: &'a SyncConfig, zone: &'a Zone, cancel: &'a CancelToken) -> Self {
        Self {
            config,
            zone,
            cancel,
        }
    }

    pub async fn run<N, T, D, W>(
        &self,
        network: &mut N,
        clock: &mut T,
        display: &mut D,
        delay: &mut W,
    ) -> Result<SyncReport, SyncError<N::Error>>
    where
        N: Network,
        T: TimeSource,
        D: Display,
        W: DelayNs,
    {
        let mut session = Session {
            config: self.config,
            cancel: self.cancel,
            network,
            console: StatusConsole::new(display, TextSize::SMALL),
            delay,
        };

        session.clear()?;
        let provisioned = session.connect().await?;

        session.print("Sync sntp ")?;
        let (server, unix_secs) = session.fetch_time().await?;
        info!("sync: {} answered {}", server, unix_secs);

        let local = self
            .zone
            .local_from_unix(unix_secs as i64)
            .map_err(SyncError::Time)?;
        clock.write(local).map_err(|err| {
            warn!("sync: clock write failed: {:?}", err);
            SyncError::Clock
        })?;

        session.clear()?;
        Ok(SyncReport {
            provisioned,
            server,
            unix_secs,
            local,
        })
    }
}

/// Borrowed capabilities for the duration of one sync.
struct Session<'s, 'd, N, D: Display, W> {
    config: &'s SyncConfig,
    cancel: &'s CancelToken,
    network: &'s mut N,
    console: StatusConsole<'d, D>,
    delay: &'s mut W,
}

impl<N, D, W> Session<'_, '_, N, D, W>
where
    N: Network,
    D: Display,
    W: DelayNs,
{
    /// Returns whether provisioning was needed to get online.
    async fn connect(&mut self) -> Result<bool, SyncError<N::Error>> {
        let cfg = self.config;

        self.print("Connecting to WiFi")?;
        self.network.begin().await.map_err(SyncError::Network)?;

        let mut wait = Wait::new(Stage::Join, cfg.join_poll, Some(cfg.join_timeout));
        loop {
            if self.network.is_connected().await {
                self.println("Connected!")?;
                return Ok(false);
            }
            self.print(".")?;
            match self.tick(&mut wait).await {
                Ok(()) => {}
                Err(SyncError::TimedOut(Stage::Join)) => break,
                Err(err) => return Err(err),
            }
        }

        info!("sync: join timed out, waiting for provisioning");
        self.println("")?;
        self.print("Waiting for SmartConfig ")?;
        self.network
            .begin_provisioning()
            .await
            .map_err(SyncError::Network)?;

        let mut wait = Wait::new(
            Stage::Provisioning,
            cfg.provisioning_poll,
            cfg.provisioning_deadline,
        );
        while !self.network.provisioning_done().await {
            self.tick(&mut wait).await?;
            self.print(".")?;
        }

        self.println("")?;
        self.print("Connecting to WiFi ")?;
        let mut wait = Wait::new(Stage::Reconnect, cfg.reconnect_poll, cfg.reconnect_deadline);
        while !self.network.is_connected().await {
            self.print(".")?;
            self.tick(&mut wait).await?;
        }
        self.println("Connected!")?;

        Ok(true)
    }

    async fn fetch_time(&mut self) -> Result<(&'static str, u64), SyncError<N::Error>> {
        let cfg = self.config;
        let mut wait = Wait::new(Stage::TimeQuery, cfg.time_poll, cfg.time_deadline);

        loop {
            for server in cfg.servers {
                match self.network.query_time(server).await {
                    Ok(unix_secs) => return Ok((server, unix_secs)),
                    Err(err) => debug!("sync: {} failed: {:?}", server, err),
                }
            }

            // No server answered this round.
            self.print(".")?;
            self.tick(&mut wait).await?;
        }
    }

    async fn tick(&mut self, wait: &mut Wait) -> Result<(), SyncError<N::Error>> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled(wait.stage));
        }

        self.delay.delay_ms(wait.poll.as_millis() as u32).await;
        wait.spent += wait.poll;

        if wait.expired() {
            return Err(SyncError::TimedOut(wait.stage));
        }
        Ok(())
    }

    fn print(&mut self, text: &str) -> Result<(), SyncError<N::Error>> {
        let result = self.console.print(text);
        Self::shown(result)
    }

    fn println(&mut self, text: &str) -> Result<(), SyncError<N::Error>> {
        let result = self.console.println(text);
        Self::shown(result)
    }

    fn clear(&mut self) -> Result<(), SyncError<N::Error>> {
        let result = self.console.clear();
        Self::shown(result)
    }

    fn shown(result: Result<(), D::Error>) -> Result<(), SyncError<N::Error>> {
        result.map_err(|err| {
            warn!("sync: status output failed: {:?}", err);
            SyncError::Display
        })
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::testing::{MockClock, MockDelay, MockDisplay, MockError, MockNetwork};

    const NOW: u64 = 1_709_769_900;

    struct Rig {
        network: MockNetwork,
        clock: MockClock,
        display: MockDisplay,
        delay: MockDelay,
    }

    impl Rig {
        fn new(network: MockNetwork) -> Self {
            Self {
                network,
                clock: MockClock::new(DateTime::default()),
                display: MockDisplay::new(400, 240),
                delay: MockDelay::default(),
            }
        }

        fn run(
            &mut self,
            config: &SyncConfig,
            cancel: &CancelToken,
        ) -> Result<SyncReport, SyncError<MockError>> {
            let zone = Zone::posix(&config.timezone).unwrap();
            let sync = TimeSync::new(config, &zone, cancel);
            block_on(sync.run(
                &mut self.network,
                &mut self.clock,
                &mut self.display,
                &mut self.delay,
            ))
        }
    }

    #[test]
    fn immediate_join_skips_provisioning_and_writes_local_time() {
        let mut rig = Rig::new(MockNetwork::connected(NOW));
        let report = rig.run(&SyncConfig::default(), &CancelToken::new()).unwrap();

        assert!(!report.provisioned);
        assert_eq!(report.server, "ntp.nict.jp");
        assert_eq!(report.local, DateTime::new(2024, 3, 7, 9, 5, 0));
        assert_eq!(rig.clock.writes, [DateTime::new(2024, 3, 7, 9, 5, 0)]);
        assert_eq!(rig.network.begin_calls, 1);
        assert_eq!(rig.network.provisioning_calls, 0);
        assert_eq!(rig.delay.total_ms, 0);
    }

    #[test]
    fn join_timeout_polls_for_five_seconds_then_provisions_once() {
        let mut network = MockNetwork::new(NOW);
        network.provisioning_polls_until_done = Some(3);
        network.reconnect_polls_until_connected = Some(2);
        let mut rig = Rig::new(network);

        let report = rig.run(&SyncConfig::default(), &CancelToken::new()).unwrap();

        assert!(report.provisioned);
        assert_eq!(rig.network.provisioning_calls, 1);
        // 10 join polls, then 3 reconnect polls.
        assert_eq!(rig.network.connected_polls, 10 + 3);
        assert_eq!(rig.network.provisioning_polls, 4);
        // 5 s join + 3 provisioning delays + 2 reconnect delays.
        assert_eq!(rig.delay.total_ms, 5_000 + 3 * 500 + 2 * 500);
    }

    #[test]
    fn failed_rounds_wait_one_second_and_fall_through_servers() {
        let mut network = MockNetwork::connected(NOW);
        network.failing_queries = 4;
        let mut rig = Rig::new(network);

        let report = rig.run(&SyncConfig::default(), &CancelToken::new()).unwrap();

        assert_eq!(report.server, "time.google.com");
        assert_eq!(
            rig.network.queried,
            [
                "ntp.nict.jp",
                "time.google.com",
                "ntp.jst.mfeed.ad.jp",
                "ntp.nict.jp",
                "time.google.com",
            ]
        );
        assert_eq!(rig.delay.total_ms, 1_000);
    }

    #[test]
    fn provisioning_deadline_reports_stage() {
        let mut rig = Rig::new(MockNetwork::new(NOW));
        let config = SyncConfig::default().with_deadline(Duration::from_secs(2));

        let err = rig.run(&config, &CancelToken::new()).unwrap_err();

        assert_eq!(err, SyncError::TimedOut(Stage::Provisioning));
        assert!(rig.clock.writes.is_empty());
        assert_eq!(rig.delay.total_ms, 5_000 + 2_000);
    }

    #[test]
    fn reconnect_deadline_reports_stage() {
        let mut network = MockNetwork::new(NOW);
        network.provisioning_polls_until_done = Some(1);
        let mut rig = Rig::new(network);
        let config = SyncConfig::default().with_deadline(Duration::from_secs(3));

        let err = rig.run(&config, &CancelToken::new()).unwrap_err();

        assert_eq!(err, SyncError::TimedOut(Stage::Reconnect));
        assert_eq!(rig.network.provisioning_calls, 1);
        assert!(rig.network.queried.is_empty());
        assert!(rig.clock.writes.is_empty());
        assert_eq!(rig.delay.total_ms, 5_000 + 500 + 3_000);
    }

    #[test]
    fn time_query_deadline_reports_stage() {
        let mut network = MockNetwork::connected(NOW);
        network.failing_queries = usize::MAX;
        let mut rig = Rig::new(network);
        let config = SyncConfig::default().with_deadline(Duration::from_secs(3));

        let err = rig.run(&config, &CancelToken::new()).unwrap_err();

        assert_eq!(err, SyncError::TimedOut(Stage::TimeQuery));
        assert_eq!(rig.network.queried.len(), 9);
    }

    #[test]
    fn cancelled_token_stops_first_wait() {
        let mut rig = Rig::new(MockNetwork::new(NOW));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = rig.run(&SyncConfig::default(), &cancel).unwrap_err();

        assert_eq!(err, SyncError::Cancelled(Stage::Join));
        assert_eq!(rig.network.provisioning_calls, 0);
        assert_eq!(rig.delay.total_ms, 0);
    }

    #[test]
    fn status_console_ends_cleared() {
        let mut rig = Rig::new(MockNetwork::connected(NOW));
        rig.run(&SyncConfig::default(), &CancelToken::new()).unwrap();

        let last = rig.display.frames.last().unwrap();
        assert_eq!(last.ink_count(), 0);
        assert!(rig.display.frames.iter().any(|frame| frame.ink_count() > 0));
    }

    #[test]
    fn timezone_override_is_applied() {
        let mut rig = Rig::new(MockNetwork::connected(NOW));
        let mut config = SyncConfig::default();
        config.timezone.clear();
        config.timezone.push_str("UTC0").unwrap();

        let report = rig.run(&config, &CancelToken::new()).unwrap();
        assert_eq!(report.local, DateTime::new(2024, 3, 7, 0, 5, 0));
    }
}
