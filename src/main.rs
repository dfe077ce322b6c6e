//! arcos-link - connect to an ARCOS robot and log its telemetry
//!
//! Connects using the configured (or discovered) serial ports, logs the
//! robot identity, then logs pose, battery and sonars from every standard
//! SIP until Ctrl-C.

use arcos_link::error::Error;
use arcos_link::{ArcosClient, ClientConfig, ConnectionState, Result, Sip, SipKind};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `arcos-link <path>` (positional)
/// - `arcos-link --config <path>` (flag-based)
/// - `arcos-link -c <path>` (short flag)
///
/// Returns `None` when no path is given; built-in defaults are used then.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

fn load_config() -> Result<ClientConfig> {
    match parse_config_path() {
        Some(path) => ClientConfig::from_file(Path::new(&path)),
        None => Ok(ClientConfig::default()),
    }
}

fn main() -> Result<()> {
    let config = load_config()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("arcos-link v{} starting...", env!("CARGO_PKG_VERSION"));

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let client = ArcosClient::new(config);
    let peer = client.connect()?;
    log::info!("Robot: {}", peer);

    while running.load(Ordering::Relaxed) {
        match client.wait_for_next(SipKind::Standard, Duration::from_millis(500)) {
            Ok(Sip::Standard(sip)) => {
                log::info!(
                    "pose=({}, {}, {}) battery={:.1}V sonars={:?}",
                    sip.x_pos,
                    sip.y_pos,
                    sip.th_pos,
                    sip.battery_voltage(),
                    client.latest_sonars()
                );
            }
            Ok(_) => {}
            Err(Error::Timeout) => {
                if client.state() == ConnectionState::Disconnected {
                    log::error!("Link to robot lost");
                    break;
                }
            }
            Err(e) => {
                log::error!("Telemetry wait failed: {}", e);
                break;
            }
        }
    }

    client.disconnect()?;
    log::info!("arcos-link stopped");
    Ok(())
}
