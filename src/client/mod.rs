//! ARCOS client facade
//!
//! `ArcosClient` owns one link to a robot controller at a time.
//!
//! # Thread Model
//!
//! While a session is open three threads touch the link:
//!
//! 1. **Caller threads**: send commands and read telemetry snapshots.
//! 2. **Receiver thread** (`arcos-receiver`): the only reader of the port.
//!    Decodes SIPs into the [`TelemetryStore`] and detects link loss.
//! 3. **Heartbeat thread** (`arcos-heartbeat`): sends PULSE so the server
//!    watchdog does not stop the robot.
//!
//! All writes go through one [`LinkWriter`], so frames never interleave.
//! Each session gets its own writer, stop flag and threads. A session's
//! writer is closed when the session ends, so a late iteration of an old
//! loop cannot reach a port opened by a later session.
//!
//! # Connecting
//!
//! ```text
//! for port in ports:
//!     for baud in baud_rates:
//!         open, send CLOSE, close, reopen, clear buffers
//!         SYNC0 → SYNC1 → SYNC2          (Timeout: next baud, I/O error: next port)
//!         OPEN, start threads, wait for first standard SIP, enable sonars
//! ```

pub mod handshake;
mod heartbeat;
mod receiver;
mod state;
mod telemetry;
mod writer;

pub use handshake::{PeerIdentity, synchronize};
pub use receiver::{ReceiverExit, ReceiverPolicy};
pub use state::ConnectionState;
pub use telemetry::{Pose, SonarArray, TelemetryStore};
pub use writer::LinkWriter;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    Argument, Command, ConfigSip, EncoderSip, IoSip, Sip, SipKind, StandardSip,
};
use crate::transport::{Connector, PortSettings, SerialConnector, Transport};
use crossbeam_channel::{Sender, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle state plus the id of the session it belongs to
struct Status {
    state: ConnectionState,
    epoch: u64,
}

/// State visible to callers and background threads
struct Shared {
    status: Mutex<Status>,
    telemetry: Arc<TelemetryStore>,
    peer: Mutex<Option<PeerIdentity>>,
    writer: Mutex<Option<Arc<LinkWriter>>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let mut status = self.status.lock();
        if status.state != state {
            log::debug!("Connection state: {} -> {}", status.state, state);
            status.state = state;
        }
    }

    /// Receiver gave up on the link. Ignored for sessions already replaced
    /// or being closed by the caller.
    fn mark_lost(&self, epoch: u64, exit: &ReceiverExit) {
        let mut status = self.status.lock();
        if status.epoch == epoch && status.state == ConnectionState::Open {
            log::error!("Connection lost ({:?}), now disconnected", exit);
            status.state = ConnectionState::Disconnected;
        }
    }
}

/// Resources of one open session
struct Session {
    writer: Arc<LinkWriter>,
    shutdown: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    receiver_handle: Option<JoinHandle<()>>,
    heartbeat_handle: Option<JoinHandle<()>>,
}

/// Client for an ARCOS robot controller on a serial link
pub struct ArcosClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl ArcosClient {
    /// Client using real serial ports
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(SerialConnector))
    }

    /// Client opening ports through `connector`
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            shared: Arc::new(Shared {
                status: Mutex::new(Status {
                    state: ConnectionState::Disconnected,
                    epoch: 0,
                }),
                telemetry: Arc::new(TelemetryStore::new()),
                peer: Mutex::new(None),
                writer: Mutex::new(None),
            }),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect using the configured ports, or every discovered port if none
    /// are configured
    pub fn connect(&self) -> Result<PeerIdentity> {
        let ports = if self.config.serial.ports.is_empty() {
            self.connector
                .discover_ports()
                .map_err(|e| Error::Connection(format!("port discovery failed: {}", e)))?
        } else {
            self.config.serial.ports.clone()
        };
        self.connect_to(&ports)
    }

    /// Connect to the first of `ports` whose robot completes the handshake
    ///
    /// An existing session is closed first. Fails with `Error::Config`
    /// before touching any port if the configuration is invalid.
    pub fn connect_to(&self, ports: &[String]) -> Result<PeerIdentity> {
        self.config.validate()?;
        let mut session = self.session.lock();
        if let Some(old) = session.take() {
            log::info!("Closing previous session before reconnecting");
            if let Err(e) = self.stop_session(old) {
                log::warn!("Previous session did not close cleanly: {}", e);
            }
        }

        if ports.is_empty() {
            return Err(Error::Connection("no serial ports to try".into()));
        }

        let settings = self.config.port_settings();
        self.shared.set_state(ConnectionState::Connecting);

        for port in ports {
            for &baud in &self.config.serial.baud_rates {
                log::info!("Trying {} @ {} baud", port, baud);
                let mut transport = match self.prepare_port(port, baud, &settings) {
                    Ok(t) => t,
                    Err(e) => {
                        log::warn!("Cannot use {}: {}", port, e);
                        break;
                    }
                };

                self.shared.set_state(ConnectionState::Syncing);
                let synced = synchronize(
                    transport.as_mut(),
                    self.config.link.sync_retries,
                    settings.read_timeout,
                );
                let raw = match synced {
                    Ok(raw) => raw,
                    Err(e) => {
                        transport.close();
                        self.shared.set_state(ConnectionState::Connecting);
                        if e.is_link_noise() {
                            log::warn!("No sync on {} @ {} baud", port, baud);
                            continue;
                        }
                        log::warn!("Sync on {} failed: {}", port, e);
                        break;
                    }
                };

                let peer = PeerIdentity::new(port.clone(), baud, raw);
                log::info!("Synced with {}", peer);

                return match self.start_session(transport) {
                    Ok(started) => {
                        *session = Some(started);
                        *self.shared.peer.lock() = Some(peer.clone());
                        log::info!("Connected to {}", peer);
                        Ok(peer)
                    }
                    Err(e) => {
                        self.shared.set_state(ConnectionState::Disconnected);
                        Err(Error::Connection(format!(
                            "robot on {} did not start: {}",
                            port, e
                        )))
                    }
                };
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        Err(Error::Connection(format!(
            "no robot answered on {} at {:?} baud",
            ports.join(", "),
            self.config.serial.baud_rates
        )))
    }

    /// Open a port in a clean state
    ///
    /// A server left running by an earlier client keeps streaming SIPs and
    /// would not answer SYNC0, so it is closed first.
    fn prepare_port(
        &self,
        port: &str,
        baud: u32,
        settings: &PortSettings,
    ) -> Result<Box<dyn Transport>> {
        let mut transport = self.connector.open(port, baud, settings)?;
        if let Err(e) = Command::Close
            .encode()
            .and_then(|frame| transport.write_bytes(&frame))
        {
            log::debug!("CLOSE before sync failed on {}: {}", port, e);
        }
        transport.close();

        let mut transport = self.connector.open(port, baud, settings)?;
        transport.clear_input()?;
        transport.clear_output()?;
        Ok(transport)
    }

    /// OPEN the servers, start the threads and wait for telemetry
    fn start_session(&self, transport: Box<dyn Transport>) -> Result<Session> {
        let telemetry = Arc::clone(&self.shared.telemetry);
        telemetry.reset();

        let reader = transport.try_clone()?;
        let writer = Arc::new(LinkWriter::new(transport));
        let (stop_tx, stop_rx) = bounded(1);
        let mut session = Session {
            writer: Arc::clone(&writer),
            shutdown: Arc::new(AtomicBool::new(false)),
            stop_tx: stop_tx.clone(),
            receiver_handle: None,
            heartbeat_handle: None,
        };

        let first_sip = telemetry.generation(SipKind::Standard);
        if let Err(e) = writer.send(&Command::Open) {
            writer.close();
            return Err(e);
        }

        let epoch = {
            let mut status = self.shared.status.lock();
            status.epoch += 1;
            status.state = ConnectionState::Open;
            status.epoch
        };
        *self.shared.writer.lock() = Some(Arc::clone(&writer));

        let policy = ReceiverPolicy {
            read_timeout: self.config.port_settings().read_timeout,
            allowed_timeouts: self.config.link.allowed_timeouts,
            allowed_invalid_packets: self.config.link.allowed_invalid_packets,
        };
        let receiver_shared = Arc::clone(&self.shared);
        let receiver_shutdown = Arc::clone(&session.shutdown);
        let receiver_writer = Arc::clone(&writer);
        let spawned = thread::Builder::new()
            .name("arcos-receiver".to_string())
            .spawn(move || {
                let exit = receiver::receiver_loop(
                    reader,
                    Arc::clone(&receiver_shared.telemetry),
                    Arc::clone(&receiver_shutdown),
                    policy,
                );
                if exit != ReceiverExit::Shutdown {
                    receiver_shutdown.store(true, Ordering::Relaxed);
                    let _ = stop_tx.try_send(());
                    receiver_writer.close();
                    receiver_shared.mark_lost(epoch, &exit);
                }
            });
        match spawned {
            Ok(handle) => session.receiver_handle = Some(handle),
            Err(e) => {
                self.abort_session(session);
                return Err(Error::Other(format!("Failed to spawn receiver thread: {}", e)));
            }
        }

        let heartbeat_writer = Arc::clone(&writer);
        let heartbeat_shutdown = Arc::clone(&session.shutdown);
        let interval = Duration::from_millis(self.config.link.heartbeat_interval_ms);
        let spawned = thread::Builder::new()
            .name("arcos-heartbeat".to_string())
            .spawn(move || {
                heartbeat::heartbeat_loop(heartbeat_writer, heartbeat_shutdown, stop_rx, interval);
            });
        match spawned {
            Ok(handle) => session.heartbeat_handle = Some(handle),
            Err(e) => {
                self.abort_session(session);
                return Err(Error::Other(format!("Failed to spawn heartbeat thread: {}", e)));
            }
        }

        if let Err(e) = self.await_startup(&writer, first_sip) {
            self.abort_session(session);
            return Err(e);
        }
        Ok(session)
    }

    /// Wait for the first standard SIP, then turn the sonars on if wanted
    fn await_startup(&self, writer: &LinkWriter, after_generation: u64) -> Result<()> {
        let telemetry = &self.shared.telemetry;
        let timeout = Duration::from_millis(self.config.link.startup_timeout_ms);

        let first = match telemetry.wait_newer_than(SipKind::Standard, after_generation, timeout) {
            Ok(Sip::Standard(sip)) => sip,
            _ => {
                return Err(Error::Connection(format!(
                    "no standard SIP within {} ms of OPEN",
                    self.config.link.startup_timeout_ms
                )));
            }
        };
        log::info!(
            "Servers open, battery {:.1} V",
            first.battery_voltage()
        );

        if !self.config.link.enable_sonars || first.sonars_enabled() {
            return Ok(());
        }

        for attempt in 1..=self.config.link.sonar_enable_attempts {
            let generation = telemetry.generation(SipKind::Standard);
            writer.send(&Command::Sonar(true))?;
            match telemetry.wait_newer_than(SipKind::Standard, generation, timeout) {
                Ok(Sip::Standard(sip)) if sip.sonars_enabled() => {
                    log::info!("Sonars enabled");
                    return Ok(());
                }
                Ok(_) => log::warn!("Sonars still off (attempt {})", attempt),
                Err(e) => log::warn!("No SIP after SONAR (attempt {}): {}", attempt, e),
            }
        }
        Err(Error::Connection(format!(
            "sonars did not turn on after {} attempts",
            self.config.link.sonar_enable_attempts
        )))
    }

    /// Tear down a session that never finished starting
    fn abort_session(&self, session: Session) {
        if let Err(e) = self.stop_session(session) {
            log::warn!("Session teardown after failed start: {}", e);
        }
    }

    /// Stop the threads, say goodbye to the server and release the port
    fn stop_session(&self, mut session: Session) -> Result<()> {
        self.shared.set_state(ConnectionState::Closing);
        session.shutdown.store(true, Ordering::Relaxed);
        let _ = session.stop_tx.try_send(());

        let mut result = Ok(());
        if let Some(handle) = session.heartbeat_handle.take() {
            if handle.join().is_err() {
                log::error!("Heartbeat thread panicked");
                result = Err(Error::ThreadPanic);
            }
        }

        // Heartbeat is gone, so these are the last frames on the wire
        if !session.writer.is_closed() {
            for command in [Command::Stop, Command::Close] {
                if let Err(e) = session.writer.send(&command) {
                    log::debug!("{:?} during disconnect failed: {}", command, e);
                }
            }
        }
        session.writer.close();

        if let Some(handle) = session.receiver_handle.take() {
            if handle.join().is_err() {
                log::error!("Receiver thread panicked");
                result = Err(Error::ThreadPanic);
            }
        }

        *self.shared.writer.lock() = None;
        *self.shared.peer.lock() = None;
        self.shared.set_state(ConnectionState::Disconnected);
        log::info!("Disconnected");
        result
    }

    /// Close the session, if any
    ///
    /// Safe to call repeatedly and from any thread. Returns once both
    /// background threads have exited and the port is released.
    pub fn disconnect(&self) -> Result<()> {
        let mut session = self.session.lock();
        match session.take() {
            Some(open) => self.stop_session(open),
            None => {
                self.shared.set_state(ConnectionState::Disconnected);
                Ok(())
            }
        }
    }

    /// Send a command to the robot
    ///
    /// Fails with `ProtocolUsage` unless the connection is open.
    pub fn send_command(&self, command: Command) -> Result<()> {
        let state = self.state();
        if !state.is_open() {
            return Err(Error::usage(format!(
                "cannot send {:?} while {}",
                command, state
            )));
        }
        let writer = self.shared.writer.lock().clone();
        match writer {
            Some(writer) => writer.send(&command),
            None => Err(Error::usage("not connected")),
        }
    }

    /// Send a command by code, checking the argument against the command table
    pub fn send_raw(&self, code: u8, arg: Argument) -> Result<()> {
        self.send_command(Command::raw(code, arg)?)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Identity reported by the robot for the current session
    pub fn peer(&self) -> Option<PeerIdentity> {
        self.shared.peer.lock().clone()
    }

    /// Shared telemetry slots, for callers that want to wait on them directly
    pub fn telemetry(&self) -> Arc<TelemetryStore> {
        Arc::clone(&self.shared.telemetry)
    }

    pub fn latest_standard(&self) -> Option<Arc<StandardSip>> {
        self.shared.telemetry.standard()
    }

    pub fn latest_config(&self) -> Option<Arc<ConfigSip>> {
        self.shared.telemetry.config()
    }

    pub fn latest_encoder(&self) -> Option<Arc<EncoderSip>> {
        self.shared.telemetry.encoder()
    }

    pub fn latest_io(&self) -> Option<Arc<IoSip>> {
        self.shared.telemetry.io()
    }

    /// First `sonar_count` sonar ranges in mm, `None` where nothing is in range
    ///
    /// Every entry is `None` until the first standard SIP arrives.
    pub fn latest_sonars(&self) -> Vec<Option<u16>> {
        self.shared
            .telemetry
            .sonars()
            .readings(self.config.link.sonar_count)
    }

    pub fn latest_pose(&self) -> Option<Pose> {
        self.latest_standard().map(|sip| Pose::from(sip.as_ref()))
    }

    pub fn latest_battery_voltage(&self) -> Option<f32> {
        self.latest_standard().map(|sip| sip.battery_voltage())
    }

    /// Block until a SIP of `kind` newer than the current one arrives
    pub fn wait_for_next(&self, kind: SipKind, timeout: Duration) -> Result<Sip> {
        self.shared.telemetry.wait_for_next(kind, timeout)
    }
}

impl Drop for ArcosClient {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::warn!("Disconnect on drop failed: {}", e);
        }
    }
}
