//! ARCOS wire protocol: framing, commands and SIP decoding
//!
//! Pure functions and types only; nothing here owns a port or a thread.

pub mod command;
pub mod constants;
pub mod packet;
pub mod sip;

pub use command::{ArgKind, Argument, Command, arg_kind};
pub use packet::{Packet, checksum, decode_packet, encode_packet, read_frame, read_packet};
pub use sip::{ConfigSip, EncoderSip, IoSip, Sip, SipKind, SonarReading, StandardSip, decode_sip};
