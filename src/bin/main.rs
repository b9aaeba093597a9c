#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::Runner;
use embassy_time::{Delay as AsyncDelay, Timer};
use esp_hal::{
    Blocking,
    clock::CpuClock,
    delay::Delay,
    gpio::{Level, Output, OutputConfig, RtcPin},
    peripherals::WIFI,
    rtc_cntl::{Rtc, SocResetReason, reset_reason, wakeup_cause},
    spi::master::Spi,
    system::Cpu,
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_radio::wifi::WifiDevice;
use log::{LevelFilter, info, warn};
use static_cell::StaticCell;
use ls027b7dh01::SharpDisplay;
use wakeclock_core::{
    boot::{BootConfig, BootController, BootReason, resolve_zone},
    credentials::WifiCredentials,
    power::BatteryCurve,
    sync::CancelToken,
};
use wakeclock_hal_esp32s3::{
    network::EspNetwork,
    platform::{battery::AdcBattery, rtc_clock::RtcClock},
    storage::flash_credentials::FlashCredentialStore,
};

use power::BoardPower;

#[path = "main/power.rs"]
mod power;

const DISPLAY_SPI_HZ: u32 = 1_000_000;
const NET_SEED: u64 = 0x3C71_9A04_E2B8_5D16;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<embassy_net::StackResources<4>> = StaticCell::new();
static CANCEL: CancelToken = CancelToken::new();

type BoardNetwork = EspNetwork<'static, FlashCredentialStore>;

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

async fn halt() -> ! {
    loop {
        Timer::after_secs(1).await;
    }
}

/// Radio, station and stack. `None` leaves the clock unsynced for this boot.
fn start_network(wifi: WIFI<'static>) -> Option<(BoardNetwork, Runner<'static, WifiDevice<'static>>)> {
    let radio = match esp_radio::init() {
        Ok(radio) => RADIO.init(radio),
        Err(err) => {
            warn!("esp-radio init failed: {:?}", err);
            return None;
        }
    };

    let (controller, interfaces) =
        match esp_radio::wifi::new(radio, wifi, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                warn!("wifi peripheral init failed: {:?}", err);
                return None;
            }
        };

    let store = match FlashCredentialStore::new() {
        Ok(store) => store,
        Err(err) => {
            warn!("credential store unavailable: {:?}", err);
            return None;
        }
    };

    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(embassy_net::StackResources::<4>::new()),
        NET_SEED,
    );

    let mut network = EspNetwork::new(controller, interfaces.sniffer, stack, store);

    // Build-time defaults only fill an empty store.
    if let (Some(ssid), Some(password)) = (
        option_env!("WAKECLOCK_WIFI_SSID"),
        option_env!("WAKECLOCK_WIFI_PASSWORD"),
    ) {
        match WifiCredentials::new(ssid, password) {
            Ok(creds) => match network.seed_credentials(&creds) {
                Ok(true) => info!("wifi: seeded credentials for \"{}\"", ssid),
                Ok(false) => {}
                Err(err) => warn!("wifi: seeding credentials failed: {:?}", err),
            },
            Err(err) => warn!("wifi: build-time credentials rejected: {:?}", err),
        }
    }

    Some((network, runner))
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: wakeclock starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    let boot_reset_reason = reset_reason(Cpu::ProCpu);
    let reason =
        BootReason::from_wake(boot_reset_reason == Some(SocResetReason::CoreDeepSleep));
    info!(
        "boot reset_reason={:?} wakeup_cause={:?} -> {:?}",
        boot_reset_reason,
        wakeup_cause(),
        reason
    );

    // esp-radio requires an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // CLK=GPIO13, DI=GPIO14, CS=GPIO15, DISP=GPIO2, EMD=GPIO9
    let disp_pin = peripherals.GPIO2;
    // DISP stays latched high through deep sleep; take it back.
    disp_pin.rtcio_pad_hold(false);
    let disp = Output::new(disp_pin, Level::High, OutputConfig::default());
    let emd = Output::new(peripherals.GPIO9, Level::Low, OutputConfig::default());
    let cs = Output::new(peripherals.GPIO15, Level::Low, OutputConfig::default());

    let spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_hz(DISPLAY_SPI_HZ))
        // LS027B7DH01 uses CPOL=0, CPHA=1.
        .with_mode(esp_hal::spi::Mode::_1);
    let spi: Spi<'static, Blocking> = match Spi::new(peripherals.SPI2, spi_config) {
        Ok(spi) => spi
            .with_sck(peripherals.GPIO13)
            .with_mosi(peripherals.GPIO14),
        Err(err) => {
            warn!("display spi config failed: {:?}", err);
            halt().await
        }
    };

    let mut display = SharpDisplay::new(spi, disp, emd, cs, Delay::new());
    if let Err(err) = display.initialize() {
        warn!("display initialize failed: {:?}", err);
    }
    if reason == BootReason::ColdBoot {
        if let Err(err) = display.clear_all() {
            warn!("display clear failed: {:?}", err);
        }
    }

    let mut boot_config = BootConfig::default();
    if let Some(rule) = option_env!("WAKECLOCK_TZ") {
        boot_config.sync.timezone.clear();
        if boot_config.sync.timezone.push_str(rule).is_err() {
            warn!("timezone rule too long, keeping the default");
            boot_config = BootConfig::default();
        }
    }

    let zone = resolve_zone(&boot_config.sync.timezone);
    let clock = RtcClock::new(Rtc::new(peripherals.LPWR), zone);
    info!("rtc: unix {}", clock.unix_secs());

    // Cell voltage through a 1:2 divider on GPIO1.
    let battery = AdcBattery::new(peripherals.ADC1, peripherals.GPIO1, BatteryCurve::default());
    let board_power = BoardPower::new(battery);

    let (network, runner) = match reason {
        BootReason::ColdBoot => match start_network(peripherals.WIFI) {
            Some((network, runner)) => (Some(network), Some(runner)),
            None => (None, None),
        },
        BootReason::InterruptWake => (None, None),
    };

    let mut boot = BootController::new(
        clock,
        network,
        display,
        board_power,
        AsyncDelay,
        boot_config,
        &CANCEL,
    );

    let report = match runner {
        Some(mut runner) => match select(runner.run(), boot.run_cycle(reason)).await {
            Either::First(never) => never,
            Either::Second(report) => report,
        },
        None => boot.run_cycle(reason).await,
    };

    info!(
        "boot: showing {:?} battery={}% sync={:?}",
        report.reading.now, report.reading.battery_percent, report.sync
    );
    boot.sleep()
}
