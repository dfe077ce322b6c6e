//! arcos-link - Serial-link client for ARCOS robot controllers
//!
//! Talks to the ARCOS server firmware of Pioneer-class mobile robots over a
//! serial line: synchronizes with the server, keeps its watchdog fed, sends
//! commands and decodes the Server Information Packets (SIPs) it streams
//! back.
//!
//! ```no_run
//! use arcos_link::{ArcosClient, ClientConfig, Command};
//!
//! let client = ArcosClient::new(ClientConfig::default());
//! let peer = client.connect()?;
//! println!("connected to {}", peer);
//! client.send_command(Command::Vel(200))?;
//! println!("sonars: {:?}", client.latest_sonars());
//! client.disconnect()?;
//! # Ok::<(), arcos_link::Error>(())
//! ```
//!
//! ## Features
//!
//! - `mock`: In-memory transport and connector for hardware-free testing

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use client::{ArcosClient, ConnectionState, PeerIdentity, Pose};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use protocol::{Argument, Command, Sip, SipKind};
