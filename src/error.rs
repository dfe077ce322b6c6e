//! Error types for the ARCOS link

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ARCOS link error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error (open, configure, enumerate)
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error on an open transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No (or not enough) bytes arrived before the deadline
    #[error("Communication timeout")]
    Timeout,

    /// Header, length, checksum or field layout mismatch
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// No candidate port/baud combination completed the handshake,
    /// or the session could not be brought up after syncing
    #[error("Connection error: {0}")]
    Connection(String),

    /// Caller misuse: wrong argument type for a command code, unknown code,
    /// or a command sent while the link is not open
    #[error("Protocol usage error: {0}")]
    ProtocolUsage(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Config serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// A background thread panicked
    #[error("Background thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Routine serial-link noise, recovered locally by the handshake and
    /// receiver loop instead of being escalated.
    pub fn is_link_noise(&self) -> bool {
        matches!(self, Error::Timeout | Error::InvalidPacket(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidPacket(msg.into())
    }

    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Error::ProtocolUsage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_noise_classification() {
        assert!(Error::Timeout.is_link_noise());
        assert!(Error::invalid("bad checksum").is_link_noise());
        assert!(!Error::usage("not connected").is_link_noise());
        assert!(!Error::Connection("exhausted".into()).is_link_noise());
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::Timeout.to_string(), "Communication timeout");
        assert_eq!(
            Error::invalid("header").to_string(),
            "Invalid packet: header"
        );
    }
}
