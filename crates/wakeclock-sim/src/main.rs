//! Runs the clock's boot cycle on a host.
//!
//! Cold boot syncs over the scripted network and real (or fixed) NTP, then
//! draws the face in the terminal. Deep sleep waits for Enter, which plays
//! the button and relaunches the process as an interrupt wake.

mod host;
mod network;
mod settings;
mod terminal;

use std::{
    cell::RefCell,
    io::{IsTerminal, stdout},
    rc::Rc,
};

use anyhow::{Result, bail};
use log::info;
use wakeclock_core::{
    boot::{BootConfig, BootController, BootReason, resolve_zone},
    credentials::CredentialStore,
    sync::CancelToken,
};

use host::{HostClock, HostDelay, Retained, SimPower, unset_clock_offset};
use network::SimNetwork;
use settings::Settings;
use terminal::TerminalDisplay;

const PANEL_WIDTH: usize = 400;
const PANEL_HEIGHT: usize = 240;

static CANCEL: CancelToken = CancelToken::new();

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env()?;
    let reason = BootReason::from_wake(settings.woke);
    info!("sim: {:?}", reason);

    let mut config = BootConfig::default();
    if let Some(rule) = &settings.timezone {
        config.sync.timezone.clear();
        if config.sync.timezone.push_str(rule).is_err() {
            bail!("timezone rule {rule:?} is too long");
        }
    }
    if let Some(limit) = settings.sync_deadline {
        config.sync = config.sync.with_deadline(limit);
    }

    let retained = Rc::new(RefCell::new(Retained {
        clock_offset: settings.clock_offset.unwrap_or_else(unset_clock_offset),
        ..Retained::default()
    }));
    if let Some(creds) = &settings.stored {
        if let Err(err) = retained.borrow_mut().store.save(creds) {
            bail!("storing credentials: {err:?}");
        }
    }

    let clock = HostClock::new(retained.clone(), resolve_zone(&config.sync.timezone));
    let network = match reason {
        BootReason::ColdBoot => Some(SimNetwork::new(
            retained.clone(),
            settings.access_point,
            settings.phone,
            settings.ntp,
        )),
        BootReason::InterruptWake => None,
    };
    let out = stdout();
    let clear_screen = out.is_terminal();
    let display = TerminalDisplay::new(out, PANEL_WIDTH, PANEL_HEIGHT, clear_screen);
    let power = SimPower::new(retained, settings.battery_mv);

    let controller = BootController::new(clock, network, display, power, HostDelay, config, &CANCEL);
    embassy_futures::block_on(controller.run(reason))
}
