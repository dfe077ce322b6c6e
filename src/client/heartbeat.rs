//! Heartbeat thread
//!
//! The ARCOS server stops the robot when no command arrives within its
//! watchdog window (about 2 s). This loop sends PULSE at a fixed interval
//! well inside that window.
//!
//! Send failures are only logged. The receiver loop is the one that decides
//! the link is gone; tearing down from here too would race it.

use super::writer::LinkWriter;
use crate::error::Error;
use crate::protocol::Command;
use crossbeam_channel::{Receiver, select, tick};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Send PULSE every `interval` until stopped
///
/// Stops when `shutdown` is set, when `stop` receives a message or is
/// disconnected, or when the writer has been closed.
pub(super) fn heartbeat_loop(
    writer: Arc<LinkWriter>,
    shutdown: Arc<AtomicBool>,
    stop: Receiver<()>,
    interval: Duration,
) {
    let ticker = tick(interval);

    while !shutdown.load(Ordering::Relaxed) {
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {}
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match writer.send(&Command::Pulse) {
            Ok(()) => log::trace!("Heartbeat sent"),
            Err(Error::ProtocolUsage(_)) => {
                log::debug!("Writer closed, heartbeat stopping");
                break;
            }
            Err(e) => log::warn!("Heartbeat send failed: {}", e),
        }
    }

    log::info!("Heartbeat thread exiting");
}
