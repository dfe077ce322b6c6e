//! Latest-telemetry slots shared between the receiver loop and callers
//!
//! Each SIP variant has one slot holding an `Arc` to the most recent record.
//! The receiver swaps the `Arc` under a short mutex hold, so readers always
//! get a complete old or new record and never wait on serial I/O. A
//! per-variant generation counter plus a condvar back `wait_for_next`.

use crate::error::{Error, Result};
use crate::protocol::constants::{MAX_SONARS, SONAR_NO_READING_MM};
use crate::protocol::{ConfigSip, EncoderSip, IoSip, Sip, SipKind, StandardSip};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Most recent range per sonar, merged across standard SIPs
///
/// The server only reports sonars polled since the previous SIP, so each
/// slot keeps its last value until that sonar is reported again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SonarArray {
    ranges_mm: [u16; MAX_SONARS],
}

impl SonarArray {
    pub fn new() -> Self {
        Self {
            ranges_mm: [SONAR_NO_READING_MM; MAX_SONARS],
        }
    }

    fn merge(&mut self, sip: &StandardSip) {
        for reading in &sip.sonars {
            if let Some(slot) = self.ranges_mm.get_mut(reading.number as usize) {
                *slot = reading.range_mm;
            } else {
                log::debug!("Ignoring out-of-range sonar number {}", reading.number);
            }
        }
    }

    /// Raw range in mm, sentinel included
    pub fn raw(&self, index: usize) -> Option<u16> {
        self.ranges_mm.get(index).copied()
    }

    /// First `count` sonars, `None` where nothing was in range
    pub fn readings(&self, count: usize) -> Vec<Option<u16>> {
        self.ranges_mm
            .iter()
            .take(count)
            .map(|&mm| (mm != SONAR_NO_READING_MM).then_some(mm))
            .collect()
    }
}

impl Default for SonarArray {
    fn default() -> Self {
        Self::new()
    }
}

/// Odometry from the latest standard SIP
///
/// `x` and `y` are the server's wrapping millimetre counters, `th` is in
/// server angle units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pose {
    pub x: u16,
    pub y: u16,
    pub th: i16,
}

impl From<&StandardSip> for Pose {
    fn from(sip: &StandardSip) -> Self {
        Self {
            x: sip.x_pos,
            y: sip.y_pos,
            th: sip.th_pos,
        }
    }
}

#[derive(Default)]
struct Slots {
    standard: Option<Arc<StandardSip>>,
    config: Option<Arc<ConfigSip>>,
    encoder: Option<Arc<EncoderSip>>,
    io: Option<Arc<IoSip>>,
    sonars: SonarArray,
    generations: [u64; 4],
}

impl Slots {
    fn get(&self, kind: SipKind) -> Option<Sip> {
        match kind {
            SipKind::Standard => self.standard.as_deref().cloned().map(Sip::Standard),
            SipKind::Config => self.config.as_deref().cloned().map(Sip::Config),
            SipKind::Encoder => self.encoder.as_deref().copied().map(Sip::Encoder),
            SipKind::Io => self.io.as_deref().cloned().map(Sip::Io),
        }
    }
}

/// Shared latest-SIP store
#[derive(Default)]
pub struct TelemetryStore {
    slots: Mutex<Slots>,
    updated: Condvar,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a decoded SIP and wake waiters for its variant
    ///
    /// Returns `false` for SIPs without a slot (`Sip::Unknown`).
    pub fn publish(&self, sip: Sip) -> bool {
        let mut slots = self.slots.lock();
        let kind = match sip {
            Sip::Standard(s) => {
                slots.sonars.merge(&s);
                slots.standard = Some(Arc::new(s));
                SipKind::Standard
            }
            Sip::Config(c) => {
                slots.config = Some(Arc::new(c));
                SipKind::Config
            }
            Sip::Encoder(e) => {
                slots.encoder = Some(Arc::new(e));
                SipKind::Encoder
            }
            Sip::Io(io) => {
                slots.io = Some(Arc::new(io));
                SipKind::Io
            }
            Sip::Unknown(_) => return false,
        };
        slots.generations[kind.index()] += 1;
        drop(slots);
        self.updated.notify_all();
        true
    }

    pub fn standard(&self) -> Option<Arc<StandardSip>> {
        self.slots.lock().standard.clone()
    }

    pub fn config(&self) -> Option<Arc<ConfigSip>> {
        self.slots.lock().config.clone()
    }

    pub fn encoder(&self) -> Option<Arc<EncoderSip>> {
        self.slots.lock().encoder.clone()
    }

    pub fn io(&self) -> Option<Arc<IoSip>> {
        self.slots.lock().io.clone()
    }

    pub fn sonars(&self) -> SonarArray {
        self.slots.lock().sonars
    }

    /// Number of SIPs of `kind` stored so far
    pub fn generation(&self, kind: SipKind) -> u64 {
        self.slots.lock().generations[kind.index()]
    }

    /// Wait for a SIP of `kind` newer than `generation`
    pub fn wait_newer_than(&self, kind: SipKind, generation: u64, timeout: Duration) -> Result<Sip> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots.lock();
        while slots.generations[kind.index()] <= generation {
            if self.updated.wait_until(&mut slots, deadline).timed_out()
                && slots.generations[kind.index()] <= generation
            {
                return Err(Error::Timeout);
            }
        }
        slots.get(kind).ok_or(Error::Timeout)
    }

    /// Wait for the next SIP of `kind` stored after this call
    pub fn wait_for_next(&self, kind: SipKind, timeout: Duration) -> Result<Sip> {
        let generation = self.generation(kind);
        self.wait_newer_than(kind, generation, timeout)
    }

    /// Forget everything (new session)
    pub fn reset(&self) {
        let mut slots = self.slots.lock();
        let generations = slots.generations;
        *slots = Slots::default();
        // Generations keep counting so stale waiters cannot be satisfied by a reset
        slots.generations = generations;
    }
}
