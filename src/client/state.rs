//! Connection lifecycle state

use std::fmt;

/// Lifecycle of an [`ArcosClient`](super::ArcosClient) connection
///
/// ```text
/// Disconnected → Connecting → Syncing → Open → Closing → Disconnected
///                                        │
///                                        └── link lost ──→ Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Opening candidate ports
    Connecting,
    /// Running the SYNC0/1/2 exchange on an opened port
    Syncing,
    /// Servers open, background loops running
    Open,
    /// `disconnect()` in progress
    Closing,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Syncing => "syncing",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}
