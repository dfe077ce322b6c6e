//! Test utilities for arcos-link scenarios.
//!
//! Provides a scripted ARCOS robot that answers through `MockTransport`,
//! frame helpers and a short-timeout client configuration.

#![allow(dead_code)]

use arcos_link::ClientConfig;
use arcos_link::protocol::constants::*;
use arcos_link::protocol::{Packet, decode_packet, encode_packet};
use arcos_link::transport::mock::{MockConnector, MockTransport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const PORT: &str = "/dev/ttyUSB0";
pub const BAUD: u32 = 9600;

/// Name, class and subclass the robot reports after SYNC2
pub const IDENTITY: &[u8] = b"Marvin\0Pioneer\0p3dx-sh\0";

/// Sonar ranges the robot reports while its sonars are on
pub const SONAR_RANGES: [(u8, u16); 8] = [
    (0, 500),
    (1, 5000),
    (2, 5000),
    (3, 5000),
    (4, 5000),
    (5, 5000),
    (6, 5000),
    (7, 500),
];

/// Client config with timeouts short enough for tests
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.serial.ports = vec![PORT.to_string()];
    config.serial.baud_rates = vec![BAUD];
    config.serial.read_timeout_ms = 50;
    config.serial.write_timeout_ms = 50;
    config.link.sync_retries = 3;
    config.link.heartbeat_interval_ms = 20;
    config.link.startup_timeout_ms = 1000;
    config
}

pub fn connector(mock: &MockTransport) -> Arc<MockConnector> {
    Arc::new(MockConnector::new(&[PORT], mock.clone()))
}

/// Standard SIP payload: fixed odometry, 12.5 V battery
pub fn standard_payload(flags: u16, sonars: &[(u8, u16)]) -> Vec<u8> {
    let mut p = vec![SIP_STANDARD_STOPPED];
    p.extend_from_slice(&1000u16.to_le_bytes()); // x
    p.extend_from_slice(&2000u16.to_le_bytes()); // y
    p.extend_from_slice(&90i16.to_le_bytes()); // th
    p.extend_from_slice(&0i16.to_le_bytes()); // left vel
    p.extend_from_slice(&0i16.to_le_bytes()); // right vel
    p.push(125);
    p.extend_from_slice(&0u16.to_le_bytes()); // stall and bumpers
    p.extend_from_slice(&0u16.to_le_bytes()); // control
    p.extend_from_slice(&flags.to_le_bytes());
    p.push(0); // compass
    p.push(sonars.len() as u8);
    for &(number, range) in sonars {
        p.push(number);
        p.extend_from_slice(&range.to_le_bytes());
    }
    p
}

/// Split a captured byte stream into frames, panicking on anything malformed
pub fn parse_frames(stream: &[u8]) -> Vec<Packet> {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
        assert!(offset + 3 <= stream.len(), "truncated header at {}", offset);
        let end = offset + 3 + stream[offset + 2] as usize;
        assert!(end <= stream.len(), "truncated frame at {}", offset);
        let packet = decode_packet(&stream[offset..end])
            .unwrap_or_else(|e| panic!("bad frame at {}: {}", offset, e));
        frames.push(packet);
        offset = end;
    }
    frames
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Observes and steers a running scripted robot
#[derive(Clone, Default)]
pub struct PeerControl {
    muted: Arc<AtomicBool>,
    pulses: Arc<AtomicUsize>,
    sonar_requests: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
}

impl PeerControl {
    /// A muted robot still tracks commands but sends nothing back
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    pub fn pulses(&self) -> usize {
        self.pulses.load(Ordering::SeqCst)
    }

    pub fn sonar_requests(&self) -> usize {
        self.sonar_requests.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitSync1,
    AwaitSync2,
    Synced,
    Open,
}

/// Scripted ARCOS server
///
/// Echoes SYNC0/1/2 (SYNC2 with [`IDENTITY`]), and once OPEN has been
/// received answers every command with a standard SIP, standing in for
/// the periodic SIP stream of a real robot.
pub struct RobotPeer {
    sonars_on: bool,
    ignore_sonar_requests: usize,
    streams_sips: bool,
}

impl Default for RobotPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotPeer {
    pub fn new() -> Self {
        Self {
            sonars_on: true,
            ignore_sonar_requests: 0,
            streams_sips: true,
        }
    }

    /// Start with sonars disabled
    pub fn sonars_off(mut self) -> Self {
        self.sonars_on = false;
        self
    }

    /// Ignore the first `n` SONAR commands
    pub fn ignoring_sonar_requests(mut self, n: usize) -> Self {
        self.ignore_sonar_requests = n;
        self
    }

    /// Complete the handshake but never send a SIP
    pub fn without_sips(mut self) -> Self {
        self.streams_sips = false;
        self
    }

    pub fn start(self) -> (MockTransport, PeerControl) {
        let control = PeerControl::default();
        let peer_control = control.clone();
        let mut phase = Phase::Idle;
        let mut sonars_on = self.sonars_on;
        let mut ignored = 0;

        let mock = MockTransport::with_responder(move |written| {
            let Ok(packet) = decode_packet(written) else {
                return Vec::new();
            };
            let payload = packet.payload();
            let Some(&code) = payload.first() else {
                return Vec::new();
            };

            let sip = |sonars_on: bool| {
                if sonars_on {
                    standard_payload(FLAG_SONARS_ENABLED, &SONAR_RANGES)
                } else {
                    standard_payload(0, &[])
                }
            };

            let reply = match (phase, code) {
                (Phase::Open, CMD_CLOSE) => {
                    phase = Phase::Idle;
                    None
                }
                (Phase::Open, CMD_STOP) => None,
                (Phase::Open, CMD_PULSE) => {
                    peer_control.pulses.fetch_add(1, Ordering::SeqCst);
                    Some(sip(sonars_on))
                }
                (Phase::Open, CMD_SONAR) => {
                    peer_control.sonar_requests.fetch_add(1, Ordering::SeqCst);
                    if ignored < self.ignore_sonar_requests {
                        ignored += 1;
                    } else {
                        sonars_on = payload.get(1..3) == Some(&[ARG_INT_POSITIVE, 1][..]);
                    }
                    Some(sip(sonars_on))
                }
                (Phase::Open, _) => Some(sip(sonars_on)),
                (_, SYNC0) => {
                    phase = Phase::AwaitSync1;
                    Some(vec![SYNC0])
                }
                (Phase::AwaitSync1, SYNC1) => {
                    phase = Phase::AwaitSync2;
                    Some(vec![SYNC1])
                }
                (Phase::AwaitSync2, SYNC2) => {
                    phase = Phase::Synced;
                    let mut reply = vec![SYNC2];
                    reply.extend_from_slice(IDENTITY);
                    Some(reply)
                }
                (Phase::Synced, CMD_OPEN) => {
                    peer_control.opens.fetch_add(1, Ordering::SeqCst);
                    phase = Phase::Open;
                    Some(sip(sonars_on))
                }
                _ => {
                    phase = Phase::Idle;
                    None
                }
            };

            let silent = peer_control.muted.load(Ordering::SeqCst)
                || (phase == Phase::Open && !self.streams_sips);
            match reply {
                Some(payload) if !silent => encode_packet(&payload).unwrap_or_default(),
                _ => Vec::new(),
            }
        });
        (mock, control)
    }
}
