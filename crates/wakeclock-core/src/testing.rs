//! Scripted fakes for the capability traits.

use std::{string::String, vec::Vec};

use embedded_hal_async::delay::DelayNs;

use crate::{
    power::{Power, WakeSource},
    render::{Canvas, Display},
    sync::Network,
    time::{DateTime, TimeSource},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MockError;

/// Delay that records the requested time and returns at once.
#[derive(Debug, Default)]
pub struct MockDelay {
    pub total_ms: u64,
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ms += (ns / 1_000_000) as u64;
    }

    async fn delay_us(&mut self, us: u32) {
        self.total_ms += (us / 1_000) as u64;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms as u64;
    }
}

/// Network whose connection and provisioning progress are scripted as a
/// number of failed polls before success. `None` never succeeds.
#[derive(Debug)]
pub struct MockNetwork {
    pub join_polls_until_connected: Option<usize>,
    pub provisioning_polls_until_done: Option<usize>,
    pub reconnect_polls_until_connected: Option<usize>,
    /// Individual queries that fail before the first success.
    pub failing_queries: usize,
    pub unix_time: u64,

    pub begin_calls: usize,
    pub connected_polls: usize,
    pub provisioning_calls: usize,
    pub provisioning_polls: usize,
    pub queried: Vec<String>,

    provisioned: bool,
    polls_in_phase: usize,
}

impl MockNetwork {
    /// Never joins on stored credentials and never gets provisioned.
    pub fn new(unix_time: u64) -> Self {
        Self {
            join_polls_until_connected: None,
            provisioning_polls_until_done: None,
            reconnect_polls_until_connected: None,
            failing_queries: 0,
            unix_time,
            begin_calls: 0,
            connected_polls: 0,
            provisioning_calls: 0,
            provisioning_polls: 0,
            queried: Vec::new(),
            provisioned: false,
            polls_in_phase: 0,
        }
    }

    /// Joins on the first poll.
    pub fn connected(unix_time: u64) -> Self {
        let mut network = Self::new(unix_time);
        network.join_polls_until_connected = Some(0);
        network
    }

    /// Any capability call at all.
    pub fn touched(&self) -> bool {
        self.begin_calls
            + self.connected_polls
            + self.provisioning_calls
            + self.provisioning_polls
            + self.queried.len()
            > 0
    }

    fn step(&mut self, script: Option<usize>) -> bool {
        let done = script.is_some_and(|failures| self.polls_in_phase >= failures);
        if done {
            self.polls_in_phase = 0;
        } else {
            self.polls_in_phase += 1;
        }
        done
    }
}

impl Network for MockNetwork {
    type Error = MockError;

    async fn begin(&mut self) -> Result<(), Self::Error> {
        self.begin_calls += 1;
        self.polls_in_phase = 0;
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        self.connected_polls += 1;
        let script = if self.provisioned {
            self.reconnect_polls_until_connected
        } else {
            self.join_polls_until_connected
        };
        self.step(script)
    }

    async fn begin_provisioning(&mut self) -> Result<(), Self::Error> {
        self.provisioning_calls += 1;
        self.polls_in_phase = 0;
        Ok(())
    }

    async fn provisioning_done(&mut self) -> bool {
        self.provisioning_polls += 1;
        let done = self.step(self.provisioning_polls_until_done);
        self.provisioned |= done;
        done
    }

    async fn query_time(&mut self, server: &str) -> Result<u64, Self::Error> {
        self.queried.push(String::from(server));
        if self.failing_queries > 0 {
            self.failing_queries -= 1;
            return Err(MockError);
        }
        Ok(self.unix_time)
    }
}

#[derive(Debug)]
pub struct MockClock {
    pub now: DateTime,
    pub fail_reads: bool,
    pub writes: Vec<DateTime>,
}

impl MockClock {
    pub fn new(now: DateTime) -> Self {
        Self {
            now,
            fail_reads: false,
            writes: Vec::new(),
        }
    }
}

impl TimeSource for MockClock {
    type Error = MockError;

    fn read(&mut self) -> Result<DateTime, Self::Error> {
        if self.fail_reads {
            return Err(MockError);
        }
        Ok(self.now)
    }

    fn write(&mut self, now: DateTime) -> Result<(), Self::Error> {
        self.now = now;
        self.writes.push(now);
        Ok(())
    }
}

/// Display that keeps a copy of every presented frame.
#[derive(Debug)]
pub struct MockDisplay {
    pub width: usize,
    pub height: usize,
    pub inverted: bool,
    pub frames: Vec<Canvas>,
}

impl MockDisplay {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            inverted: false,
            frames: Vec::new(),
        }
    }
}

impl Display for MockDisplay {
    type Error = MockError;

    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    fn present(&mut self, canvas: &Canvas) -> Result<(), Self::Error> {
        self.frames.push(canvas.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockPower {
    pub battery: Result<i16, MockError>,
    pub armed: Vec<WakeSource>,
}

impl MockPower {
    pub fn new(battery: Result<i16, MockError>) -> Self {
        Self {
            battery,
            armed: Vec::new(),
        }
    }
}

impl Power for MockPower {
    type Error = MockError;

    fn battery_level(&mut self) -> Result<i16, Self::Error> {
        self.battery
    }

    fn arm_wake(&mut self, source: WakeSource) -> Result<(), Self::Error> {
        self.armed.push(source);
        Ok(())
    }

    fn deep_sleep(&mut self) -> ! {
        panic!("deep sleep reached in a host test");
    }
}
