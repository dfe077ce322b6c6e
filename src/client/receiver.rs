//! Telemetry receiver loop
//!
//! The only reader of the inbound byte stream once a session is open. Each
//! iteration reads one frame, decodes it and publishes the SIP. The stop
//! flag is checked between byte reads, so a slow trickle of bytes cannot
//! hold up shutdown for longer than one read timeout.
//!
//! # Failure policy
//!
//! - **Invalid frames** are routine line noise. After more than
//!   `allowed_invalid_packets` in a row the input buffer is flushed on the
//!   assumption that the stream is misaligned; the connection stays up.
//! - **Timeouts** mean the peer went quiet. Any complete frame, valid or
//!   not, resets the count. Once more than
//!   `allowed_timeouts` happen in a row the loop gives up and reports the
//!   link as lost.
//! - **Transport I/O errors** end the loop immediately.
//!
//! The loop never changes the connection state itself. It returns why it
//! stopped and the session owner acts on that.

use super::telemetry::TelemetryStore;
use crate::error::Error;
use crate::protocol::{Sip, decode_packet, read_frame};
use crate::transport::Transport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Counter limits for the receiver loop
#[derive(Debug, Clone, Copy)]
pub struct ReceiverPolicy {
    /// Bound on each byte read
    pub read_timeout: Duration,
    pub allowed_timeouts: u32,
    pub allowed_invalid_packets: u32,
}

/// Why the receiver loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverExit {
    /// Stop flag observed
    Shutdown,
    /// Too many consecutive timeouts
    LinkLost,
    /// The transport failed outright
    IoFailure(String),
}

pub(super) fn receiver_loop(
    mut transport: Box<dyn Transport>,
    store: Arc<TelemetryStore>,
    shutdown: Arc<AtomicBool>,
    policy: ReceiverPolicy,
) -> ReceiverExit {
    let mut timeouts = 0u32;
    let mut invalids = 0u32;

    let exit = loop {
        if shutdown.load(Ordering::Relaxed) {
            break ReceiverExit::Shutdown;
        }

        let frame = read_frame(transport.as_mut(), policy.read_timeout, Some(&*shutdown));
        let result = match frame {
            Ok(Some(raw)) => {
                // A complete frame arrived, so the peer is alive even if it
                // does not decode
                timeouts = 0;
                decode_packet(&raw).and_then(|packet| Sip::parse(&packet))
            }
            Ok(None) => break ReceiverExit::Shutdown,
            Err(e) => Err(e),
        };

        // Stop requests win over whatever the last read produced
        if shutdown.load(Ordering::Relaxed) {
            break ReceiverExit::Shutdown;
        }

        match result {
            Ok(sip) => {
                invalids = 0;
                log::trace!("SIP received: {:?}", sip.kind());
                if !store.publish(sip) {
                    log::debug!("Ignoring SIP without a decoder");
                }
            }
            Err(Error::InvalidPacket(reason)) => {
                invalids += 1;
                log::debug!("Dropping invalid packet #{}: {}", invalids, reason);
                if invalids > policy.allowed_invalid_packets {
                    log::warn!(
                        "{} invalid packets in a row, flushing input buffer",
                        invalids
                    );
                    if let Err(e) = transport.clear_input() {
                        break ReceiverExit::IoFailure(e.to_string());
                    }
                    invalids = 0;
                }
            }
            Err(Error::Timeout) => {
                timeouts += 1;
                if timeouts > policy.allowed_timeouts {
                    log::error!(
                        "No data from robot after {} consecutive timeouts, link lost",
                        timeouts
                    );
                    break ReceiverExit::LinkLost;
                }
                log::warn!(
                    "Receive timeout ({}/{})",
                    timeouts,
                    policy.allowed_timeouts
                );
            }
            Err(e) => {
                log::error!("Receive failed: {}", e);
                break ReceiverExit::IoFailure(e.to_string());
            }
        }
    };

    transport.close();
    log::info!("Receiver thread exiting ({:?})", exit);
    exit
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::protocol::SipKind;
    use crate::protocol::constants::SIP_STANDARD_STOPPED;
    use crate::protocol::encode_packet;
    use crate::transport::mock::MockTransport;
    use std::thread;

    fn policy(allowed_timeouts: u32) -> ReceiverPolicy {
        ReceiverPolicy {
            read_timeout: Duration::from_millis(10),
            allowed_timeouts,
            allowed_invalid_packets: 10,
        }
    }

    fn standard_frame(battery: u8) -> Vec<u8> {
        let mut p = vec![SIP_STANDARD_STOPPED];
        p.extend_from_slice(&[0; 10]); // pose and velocities
        p.push(battery);
        p.extend_from_slice(&[0; 7]); // stall, control, flags, compass
        p.push(0); // no sonars
        encode_packet(&p).unwrap()
    }

    fn corrupt_frame() -> Vec<u8> {
        let mut frame = standard_frame(99);
        let last = frame.len() - 1;
        frame[last] ^= 0x5A;
        frame
    }

    #[test]
    fn test_invalid_packets_do_not_tear_down() {
        let mock = MockTransport::new();
        for _ in 0..5 {
            mock.inject_read(&corrupt_frame());
        }
        mock.inject_read(&standard_frame(121));

        let store = Arc::new(TelemetryStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let store = Arc::clone(&store);
            let shutdown = Arc::clone(&shutdown);
            let transport = Box::new(mock.clone());
            thread::spawn(move || receiver_loop(transport, store, shutdown, policy(1000)))
        };

        let sip = store
            .wait_newer_than(SipKind::Standard, 0, Duration::from_secs(2))
            .unwrap();
        let Sip::Standard(standard) = sip else {
            panic!("expected standard SIP");
        };
        assert_eq!(standard.battery, 121);

        shutdown.store(true, Ordering::Relaxed);
        assert_eq!(handle.join().unwrap(), ReceiverExit::Shutdown);
        assert_eq!(mock.input_clears(), 0);
    }

    #[test]
    fn test_sustained_invalid_packets_flush_input() {
        let mock = MockTransport::new();
        for _ in 0..11 {
            mock.inject_read(&corrupt_frame());
        }
        let store = Arc::new(TelemetryStore::new());
        let exit = receiver_loop(
            Box::new(mock.clone()),
            store,
            Arc::new(AtomicBool::new(false)),
            policy(0),
        );
        assert_eq!(exit, ReceiverExit::LinkLost);
        assert_eq!(mock.input_clears(), 1);
    }

    #[test]
    fn test_silence_tears_down_after_allowance() {
        let mock = MockTransport::new();
        let store = Arc::new(TelemetryStore::new());
        let exit = receiver_loop(
            Box::new(mock.clone()),
            Arc::clone(&store),
            Arc::new(AtomicBool::new(false)),
            policy(2),
        );
        assert_eq!(exit, ReceiverExit::LinkLost);
        assert_eq!(mock.read_timeouts(), 3);
        assert!(store.standard().is_none());
    }

    #[test]
    fn test_frames_reset_timeout_count() {
        let mock = MockTransport::new();
        let store = Arc::new(TelemetryStore::new());
        let feeder = {
            let mock = mock.clone();
            thread::spawn(move || {
                for battery in 0..3 {
                    thread::sleep(Duration::from_millis(15));
                    mock.inject_read(&standard_frame(battery));
                }
            })
        };
        // One timeout is allowed between frames; the gaps never add up
        let exit = receiver_loop(
            Box::new(mock.clone()),
            Arc::clone(&store),
            Arc::new(AtomicBool::new(false)),
            ReceiverPolicy {
                read_timeout: Duration::from_millis(20),
                allowed_timeouts: 2,
                allowed_invalid_packets: 10,
            },
        );
        feeder.join().unwrap();
        assert_eq!(exit, ReceiverExit::LinkLost);
        assert_eq!(store.generation(SipKind::Standard), 3);
    }

    #[test]
    fn test_closed_transport_is_io_failure() {
        let mut mock = MockTransport::new();
        mock.close();
        let exit = receiver_loop(
            Box::new(mock),
            Arc::new(TelemetryStore::new()),
            Arc::new(AtomicBool::new(false)),
            policy(2),
        );
        assert!(matches!(exit, ReceiverExit::IoFailure(_)));
    }

    #[test]
    fn test_corrupt_frames_keep_link_alive() {
        let mock = MockTransport::new();
        let done = Arc::new(AtomicBool::new(false));
        let feeder = {
            let mock = mock.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for _ in 0..8 {
                    thread::sleep(Duration::from_millis(30));
                    mock.inject_read(&corrupt_frame());
                }
                done.store(true, Ordering::SeqCst);
            })
        };
        // Each 30 ms gap costs at most two 20 ms timeouts, within the allowance
        let exit = receiver_loop(
            Box::new(mock.clone()),
            Arc::new(TelemetryStore::new()),
            Arc::new(AtomicBool::new(false)),
            ReceiverPolicy {
                read_timeout: Duration::from_millis(20),
                allowed_timeouts: 2,
                allowed_invalid_packets: 10,
            },
        );
        assert!(done.load(Ordering::SeqCst), "link dropped while frames were arriving");
        feeder.join().unwrap();
        assert_eq!(exit, ReceiverExit::LinkLost);
    }

    #[test]
    fn test_shutdown_interrupts_trickled_frame() {
        let mock = MockTransport::new();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let transport = Box::new(mock.clone());
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                receiver_loop(transport, Arc::new(TelemetryStore::new()), shutdown, policy(1000))
            })
        };

        // Longest legal frame, one byte at a time just inside the read timeout
        mock.inject_read(&[0xFA, 0xFB, 0xF9]);
        let feeder = {
            let mock = mock.clone();
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                for _ in 0..0xF9 {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    thread::sleep(Duration::from_millis(5));
                    mock.inject_read(&[0x00]);
                }
            })
        };

        thread::sleep(Duration::from_millis(50));
        let started = std::time::Instant::now();
        shutdown.store(true, Ordering::SeqCst);
        assert_eq!(handle.join().unwrap(), ReceiverExit::Shutdown);
        assert!(started.elapsed() < Duration::from_millis(500));
        feeder.join().unwrap();
    }
}
