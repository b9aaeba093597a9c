//! Wi-Fi station, broadcast provisioning sniffer and NTP over UDP.

use embassy_net::{
    IpAddress, Stack,
    dns::DnsQueryType,
    udp::{PacketMetadata, UdpSocket},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Duration, WithTimeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, PromiscuousPkt, Sniffer, WifiController, WifiError};
use log::{debug, info, warn};
use wakeclock_core::{
    credentials::{CredentialStore, WifiCredentials},
    provision::{DecodeStatus, Decoder, Frame, observe_80211},
    sync::{
        Network,
        ntp::{self, NTP_PORT, NtpError, PACKET_LEN},
    },
};

const FRAME_QUEUE_DEPTH: usize = 64;
const CHANNELS: core::ops::RangeInclusive<u8> = 1..=13;
const NTP_TIMEOUT: Duration = Duration::from_secs(3);
const NTP_LOCAL_PORT: u16 = 0;

/// Sniffed candidate frames, filled from the radio's receive callback.
static FRAMES: Channel<CriticalSectionRawMutex, Frame, FRAME_QUEUE_DEPTH> = Channel::new();

unsafe extern "C" {
    // Provided by the Wi-Fi blob; `second` is `WIFI_SECOND_CHAN_NONE` (0) here.
    fn esp_wifi_set_channel(primary: u8, second: u32) -> i32;
}

fn on_sniffed(pkt: PromiscuousPkt<'_>) {
    if let Some(frame) = observe_80211(pkt.data) {
        // Full queue: drop, the sender repeats the stream.
        let _ = FRAMES.try_send(frame);
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NetworkError<S> {
    Wifi(WifiError),
    Channel(i32),
    Dns,
    Socket,
    Timeout,
    Ntp(NtpError),
    Store(S),
}

/// ESP32-S3 station backed by an embassy-net stack.
///
/// The stack runner must be polled concurrently by the caller.
pub struct EspNetwork<'d, S> {
    controller: WifiController<'d>,
    sniffer: Sniffer<'d>,
    stack: Stack<'d>,
    store: S,
    decoder: Decoder,
    channel: u8,
    sniffing: bool,
}

impl<'d, S> EspNetwork<'d, S>
where
    S: CredentialStore,
{
    pub fn new(
        controller: WifiController<'d>,
        mut sniffer: Sniffer<'d>,
        stack: Stack<'d>,
        store: S,
    ) -> Self {
        sniffer.set_receive_cb(on_sniffed);

        Self {
            controller,
            sniffer,
            stack,
            store,
            decoder: Decoder::new(),
            channel: *CHANNELS.start(),
            sniffing: false,
        }
    }

    /// Stores `creds` unless a valid record already exists.
    pub fn seed_credentials(
        &mut self,
        creds: &WifiCredentials,
    ) -> Result<bool, NetworkError<S::Error>> {
        if let Ok(Some(_)) = self.store.load() {
            return Ok(false);
        }
        self.store.save(creds).map_err(NetworkError::Store)?;
        Ok(true)
    }

    fn join(&mut self, creds: &WifiCredentials) -> Result<(), NetworkError<S::Error>> {
        let client = ClientConfig::default()
            .with_ssid(creds.ssid.as_str().into())
            .with_password(creds.password.as_str().into());
        self.controller
            .set_config(&ModeConfig::Client(client))
            .map_err(NetworkError::Wifi)?;
        self.controller.connect().map_err(NetworkError::Wifi)?;
        info!("wifi: joining \"{}\"", creds.ssid);
        Ok(())
    }

    async fn ensure_started(&mut self) -> Result<(), NetworkError<S::Error>> {
        if !self.controller.is_started().unwrap_or(false) {
            self.controller
                .start_async()
                .await
                .map_err(NetworkError::Wifi)?;
        }
        Ok(())
    }

    fn hop(&mut self) -> Result<(), NetworkError<S::Error>> {
        self.channel = if self.channel >= *CHANNELS.end() {
            *CHANNELS.start()
        } else {
            self.channel + 1
        };

        let rc = unsafe { esp_wifi_set_channel(self.channel, 0) };
        if rc != 0 {
            return Err(NetworkError::Channel(rc));
        }
        Ok(())
    }

    fn stop_sniffing(&mut self) {
        if let Err(err) = self.sniffer.set_promiscuous_mode(false) {
            warn!("provision: leaving promiscuous mode failed: {:?}", err);
        }
        self.sniffing = false;
    }

    async fn resolve(&mut self, server: &str) -> Result<IpAddress, NetworkError<S::Error>> {
        let addrs = self
            .stack
            .dns_query(server, DnsQueryType::A)
            .await
            .map_err(|err| {
                debug!("ntp: dns {} failed: {:?}", server, err);
                NetworkError::Dns
            })?;
        addrs.first().copied().ok_or(NetworkError::Dns)
    }
}

impl<S> Network for EspNetwork<'_, S>
where
    S: CredentialStore,
{
    type Error = NetworkError<S::Error>;

    async fn begin(&mut self) -> Result<(), Self::Error> {
        self.ensure_started().await?;

        match self.store.load() {
            Ok(Some(creds)) => self.join(&creds),
            Ok(None) => {
                info!("wifi: no stored credentials");
                Ok(())
            }
            Err(err) => {
                warn!("wifi: stored credentials unreadable: {:?}", err);
                Ok(())
            }
        }
    }

    async fn is_connected(&mut self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.stack.config_v4().is_some()
    }

    async fn begin_provisioning(&mut self) -> Result<(), Self::Error> {
        // A pending join keeps the radio on one channel.
        let _ = self.controller.disconnect_async().await;
        self.ensure_started().await?;

        self.decoder.reset();
        FRAMES.clear();
        self.sniffer
            .set_promiscuous_mode(true)
            .map_err(NetworkError::Wifi)?;
        self.sniffing = true;
        self.channel = *CHANNELS.end();
        self.hop()?;

        info!("provision: listening from channel {}", self.channel);
        Ok(())
    }

    async fn provisioning_done(&mut self) -> bool {
        if !self.sniffing {
            return false;
        }

        while let Ok(frame) = FRAMES.try_receive() {
            match self.decoder.push(frame) {
                DecodeStatus::Complete(creds) => {
                    info!("provision: received credentials for \"{}\"", creds.ssid);
                    self.stop_sniffing();

                    if let Err(err) = self.store.save(&creds) {
                        warn!("provision: saving credentials failed: {:?}", err);
                    }
                    if let Err(err) = self.join(&creds) {
                        warn!("provision: join failed: {:?}", err);
                    }
                    return true;
                }
                DecodeStatus::Receiving { received, total } => {
                    debug!("provision: {}/{:?} bytes", received, total);
                }
                DecodeStatus::Searching => {}
            }
        }

        if !self.decoder.is_locked() {
            if let Err(err) = self.hop() {
                warn!("provision: channel hop failed: {:?}", err);
            }
        }
        false
    }

    async fn query_time(&mut self, server: &str) -> Result<u64, Self::Error> {
        let addr = self.resolve(server).await?;

        let mut rx_meta = [PacketMetadata::EMPTY; 1];
        let mut tx_meta = [PacketMetadata::EMPTY; 1];
        let mut rx_buffer = [0u8; 128];
        let mut tx_buffer = [0u8; 128];
        let mut socket = UdpSocket::new(
            self.stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        socket
            .bind(NTP_LOCAL_PORT)
            .map_err(|_| NetworkError::Socket)?;

        socket
            .send_to(&ntp::build_request(), (addr, NTP_PORT))
            .await
            .map_err(|_| NetworkError::Socket)?;

        let mut response = [0u8; PACKET_LEN];
        let (len, _) = socket
            .recv_from(&mut response)
            .with_timeout(NTP_TIMEOUT)
            .await
            .map_err(|_| NetworkError::Timeout)?
            .map_err(|_| NetworkError::Socket)?;

        ntp::parse_response(&response[..len]).map_err(NetworkError::Ntp)
    }
}
