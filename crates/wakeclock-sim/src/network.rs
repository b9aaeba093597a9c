//! Scripted access point and provisioning phone, with real or fixed NTP.

use std::{
    io::ErrorKind,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use log::{debug, info, warn};
use wakeclock_core::{
    credentials::{CredentialStore, WifiCredentials},
    provision::{self, DecodeStatus, Decoder, Frame, MAX_FRAMES},
    sync::{
        Network,
        ntp::{self, NTP_PORT, NtpError, PACKET_LEN},
    },
};

use crate::host::Shared;

/// Polls between a join request and association.
const JOIN_POLLS: u8 = 2;
/// Frames the phone gets on air per provisioning poll.
const FRAMES_PER_POLL: usize = 48;
/// 802.11 + LLC + IP + UDP bytes on top of each payload.
const LINK_OVERHEAD: u16 = 52;
const PHONE_MAC: [u8; 6] = [0x02, 0x5C, 0x1A, 0x00, 0x00, 0x01];
const NOISE_MAC: [u8; 6] = [0x02, 0x5C, 0x1A, 0x00, 0x00, 0x02];
const NTP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NtpSource {
    /// Query the named servers over UDP.
    Udp,
    /// Answer every query with this Unix time.
    Fixed(u64),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SimNetError {
    NotConnected,
    /// The server name has no IPv4 address.
    NoAddress,
    Io(ErrorKind),
    Ntp(NtpError),
}

impl From<std::io::Error> for SimNetError {
    fn from(err: std::io::Error) -> Self {
        SimNetError::Io(err.kind())
    }
}

pub struct SimNetwork {
    retained: Shared,
    access_point: WifiCredentials,
    phone: Option<WifiCredentials>,
    ntp: NtpSource,
    /// Polls left until association; `None` when not joining.
    joining: Option<u8>,
    decoder: Decoder,
    stream: heapless::Vec<u16, MAX_FRAMES>,
    cursor: usize,
    provisioning: bool,
}

impl SimNetwork {
    pub fn new(
        retained: Shared,
        access_point: WifiCredentials,
        phone: Option<WifiCredentials>,
        ntp: NtpSource,
    ) -> Self {
        let stream = phone.as_ref().map(provision::encode).unwrap_or_default();

        Self {
            retained,
            access_point,
            phone,
            ntp,
            joining: None,
            decoder: Decoder::new(),
            stream,
            cursor: 0,
            provisioning: false,
        }
    }

    fn join(&mut self, creds: &WifiCredentials) {
        if *creds == self.access_point {
            info!("sim: associating with \"{}\"", creds.ssid);
            self.joining = Some(JOIN_POLLS);
        } else {
            warn!("sim: \"{}\" rejected the credentials", creds.ssid);
            self.joining = None;
        }
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let len = *self.stream.get(self.cursor % self.stream.len().max(1))?;
        self.cursor += 1;
        Some(Frame {
            source: PHONE_MAC,
            len: len + LINK_OVERHEAD,
        })
    }

    fn query_udp(server: &str) -> Result<u64, SimNetError> {
        let addr = ipv4_addr((server, NTP_PORT).to_socket_addrs()?)?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(NTP_TIMEOUT))?;
        socket.send_to(&ntp::build_request(), addr)?;

        let mut response = [0u8; PACKET_LEN];
        let (len, _) = socket.recv_from(&mut response)?;
        ntp::parse_response(&response[..len]).map_err(SimNetError::Ntp)
    }
}

/// The query socket is bound to `0.0.0.0`, so only A records are usable.
fn ipv4_addr(addrs: impl IntoIterator<Item = SocketAddr>) -> Result<SocketAddr, SimNetError> {
    addrs
        .into_iter()
        .find(SocketAddr::is_ipv4)
        .ok_or(SimNetError::NoAddress)
}

impl Network for SimNetwork {
    type Error = SimNetError;

    async fn begin(&mut self) -> Result<(), Self::Error> {
        let stored = self.retained.borrow_mut().store.load();
        match stored {
            Ok(Some(creds)) => self.join(&creds),
            Ok(None) => info!("sim: no stored credentials"),
            Err(err) => warn!("sim: stored credentials unreadable: {:?}", err),
        }
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        match self.joining {
            Some(0) => true,
            Some(left) => {
                self.joining = Some(left - 1);
                false
            }
            None => false,
        }
    }

    async fn begin_provisioning(&mut self) -> Result<(), Self::Error> {
        self.joining = None;
        self.decoder.reset();
        self.cursor = 0;
        self.provisioning = true;

        match &self.phone {
            Some(creds) => info!("sim: phone broadcasting \"{}\"", creds.ssid),
            None => info!("sim: nobody is broadcasting credentials"),
        }
        Ok(())
    }

    async fn provisioning_done(&mut self) -> bool {
        if !self.provisioning {
            return false;
        }

        for n in 0..FRAMES_PER_POLL {
            // Unrelated broadcast traffic interleaved with the stream.
            if n % 7 == 3 {
                let _ = self.decoder.push(Frame {
                    source: NOISE_MAC,
                    len: 140 + n as u16,
                });
            }

            let Some(frame) = self.next_frame() else {
                break;
            };
            match self.decoder.push(frame) {
                DecodeStatus::Complete(creds) => {
                    self.provisioning = false;
                    if let Err(err) = self.retained.borrow_mut().store.save(&creds) {
                        warn!("sim: saving credentials failed: {:?}", err);
                    }
                    self.join(&creds);
                    return true;
                }
                status => debug!("sim: {:?}", status),
            }
        }
        false
    }

    async fn query_time(&mut self, server: &str) -> Result<u64, Self::Error> {
        if self.joining != Some(0) {
            return Err(SimNetError::NotConnected);
        }

        match self.ntp {
            NtpSource::Fixed(unix) => Ok(unix),
            NtpSource::Udp => Self::query_udp(server),
        }
    }
}
