//! ARCOS client commands
//!
//! Every command is a code byte plus an argument whose type is fixed per code:
//!
//! | Kind   | Payload                                   |
//! |--------|-------------------------------------------|
//! | none   | `[code]`                                  |
//! | int    | `[code, tag, lo, hi]` (tag carries sign)  |
//! | string | `[code, 0x2B, ascii..., 0x00]`            |
//!
//! The integer encoding is not two's complement: the tag byte is `0x3B` for
//! non-negative and `0x1B` for negative values, followed by the absolute
//! value little-endian.
//!
//! [`Command`] makes the argument type part of the variant, so typed callers
//! cannot pick the wrong one. [`Command::raw`] is the escape hatch for callers
//! that only have a code number; it checks the argument against [`arg_kind`].

use super::constants::*;
use super::packet::encode_packet;
use crate::error::{Error, Result};

/// Argument type declared for a command code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    None,
    Int,
    Str,
}

/// Command argument value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    None,
    Int(i32),
    Str(String),
}

impl Argument {
    pub fn kind(&self) -> ArgKind {
        match self {
            Argument::None => ArgKind::None,
            Argument::Int(_) => ArgKind::Int,
            Argument::Str(_) => ArgKind::Str,
        }
    }
}

/// Static code → argument type table; `None` for codes the client never sends
pub const fn arg_kind(code: u8) -> Option<ArgKind> {
    match code {
        CMD_PULSE | CMD_OPEN | CMD_CLOSE | CMD_CONFIG | CMD_STOP => Some(ArgKind::None),
        CMD_POLLING | CMD_SAY => Some(ArgKind::Str),
        CMD_ENABLE | CMD_SETA | CMD_SETV | CMD_SETO | CMD_MOVE | CMD_ROTATE | CMD_SETRV
        | CMD_VEL | CMD_HEAD | CMD_DHEAD | CMD_JOYREQUEST | CMD_ENCODER | CMD_RVEL
        | CMD_DCHEAD | CMD_SETRA | CMD_SONAR | CMD_DIGOUT | CMD_VEL2 | CMD_IOREQUEST
        | CMD_SOUNDTOG => Some(ArgKind::Int),
        _ => None,
    }
}

/// Commands the client sends to an ARCOS server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reset the server watchdog
    Pulse,
    /// Start the servers
    Open,
    /// Close the servers and the client connection
    Close,
    /// Change the sonar polling sequence
    Polling(String),
    /// Enable or disable the motors
    Enable(bool),
    /// Translation acceleration (+) or deceleration (-), mm/s^2
    SetAccel(i16),
    /// Maximum translation velocity, mm/s
    SetMaxVelocity(u16),
    /// Reset odometry to the origin
    ResetOrigin,
    /// Translate forward (+) or backward (-) by mm
    Move(i16),
    /// Rotate counter-clockwise (+) or clockwise (-), deg/s
    Rotate(i16),
    /// Maximum rotation velocity, deg/s
    SetMaxRotVelocity(u16),
    /// Translate at mm/s
    Vel(i16),
    /// Turn to absolute heading, degrees
    Head(i16),
    /// Turn relative to current heading, degrees
    DeltaHead(i16),
    /// Duration/tone pairs for the piezo speaker
    Say(String),
    /// Joystick SIPs: 0 stop, 1 one, >1 continuous
    JoyRequest(u16),
    /// Request a CONFIGpac SIP
    RequestConfig,
    /// Encoder SIPs: 0 stop, 1 one, >1 continuous
    EncoderRequest(u16),
    /// Rotate at deg/s
    RotVel(i16),
    /// Adjust heading relative to the last setpoint, degrees
    DeltaChangeHead(i16),
    /// Rotation acceleration (+) or deceleration (-), deg/s^2
    SetRotAccel(i16),
    /// Enable (true) or disable (false) all sonars
    Sonar(bool),
    /// Stop without disabling the motors
    Stop,
    /// User outputs: `mask` selects which ports `values` applies to
    DigitalOut { mask: u8, values: u8 },
    /// Independent wheel velocities in 20 mm/s increments
    Vel2 { left: i8, right: i8 },
    /// IO SIPs: 0 stop, 1 one, 2 continuous
    IoRequest(u16),
    /// Toggle sound
    SoundToggle(bool),
    /// Code number plus argument, checked against [`arg_kind`]
    Raw { code: u8, arg: Argument },
}

impl Command {
    /// Build a command from a bare code and argument
    ///
    /// Rejects unknown codes and arguments whose type differs from the
    /// table, so a mismatch can never reach the wire.
    pub fn raw(code: u8, arg: Argument) -> Result<Self> {
        let Some(expected) = arg_kind(code) else {
            return Err(Error::usage(format!("unknown command code {}", code)));
        };
        if arg.kind() != expected {
            return Err(Error::usage(format!(
                "command {} takes {:?} argument, got {:?}",
                code,
                expected,
                arg.kind()
            )));
        }
        validate_argument(&arg)?;
        Ok(Command::Raw { code, arg })
    }

    /// Command code byte
    pub fn code(&self) -> u8 {
        match self {
            Command::Pulse => CMD_PULSE,
            Command::Open => CMD_OPEN,
            Command::Close => CMD_CLOSE,
            Command::Polling(_) => CMD_POLLING,
            Command::Enable(_) => CMD_ENABLE,
            Command::SetAccel(_) => CMD_SETA,
            Command::SetMaxVelocity(_) => CMD_SETV,
            Command::ResetOrigin => CMD_SETO,
            Command::Move(_) => CMD_MOVE,
            Command::Rotate(_) => CMD_ROTATE,
            Command::SetMaxRotVelocity(_) => CMD_SETRV,
            Command::Vel(_) => CMD_VEL,
            Command::Head(_) => CMD_HEAD,
            Command::DeltaHead(_) => CMD_DHEAD,
            Command::Say(_) => CMD_SAY,
            Command::JoyRequest(_) => CMD_JOYREQUEST,
            Command::RequestConfig => CMD_CONFIG,
            Command::EncoderRequest(_) => CMD_ENCODER,
            Command::RotVel(_) => CMD_RVEL,
            Command::DeltaChangeHead(_) => CMD_DCHEAD,
            Command::SetRotAccel(_) => CMD_SETRA,
            Command::Sonar(_) => CMD_SONAR,
            Command::Stop => CMD_STOP,
            Command::DigitalOut { .. } => CMD_DIGOUT,
            Command::Vel2 { .. } => CMD_VEL2,
            Command::IoRequest(_) => CMD_IOREQUEST,
            Command::SoundToggle(_) => CMD_SOUNDTOG,
            Command::Raw { code, .. } => *code,
        }
    }

    /// Argument as it goes on the wire
    pub fn argument(&self) -> Argument {
        match self {
            Command::Pulse
            | Command::Open
            | Command::Close
            | Command::RequestConfig
            | Command::Stop => Argument::None,
            Command::Polling(s) | Command::Say(s) => Argument::Str(s.clone()),
            Command::Enable(on) | Command::Sonar(on) | Command::SoundToggle(on) => {
                Argument::Int(*on as i32)
            }
            // The server expects an integer here even though it is ignored
            Command::ResetOrigin => Argument::Int(0),
            Command::SetAccel(v)
            | Command::Move(v)
            | Command::Rotate(v)
            | Command::Vel(v)
            | Command::Head(v)
            | Command::DeltaHead(v)
            | Command::RotVel(v)
            | Command::DeltaChangeHead(v)
            | Command::SetRotAccel(v) => Argument::Int(*v as i32),
            Command::SetMaxVelocity(v)
            | Command::SetMaxRotVelocity(v)
            | Command::JoyRequest(v)
            | Command::EncoderRequest(v)
            | Command::IoRequest(v) => Argument::Int(*v as i32),
            Command::DigitalOut { mask, values } => {
                Argument::Int(((*mask as i32) << 8) | *values as i32)
            }
            Command::Vel2 { left, right } => {
                Argument::Int((((*left as i16) << 8) | (*right as u8 as i16)) as i32)
            }
            Command::Raw { arg, .. } => arg.clone(),
        }
    }

    /// Command payload (code byte plus encoded argument), without framing
    pub fn payload(&self) -> Result<Vec<u8>> {
        let arg = self.argument();
        validate_argument(&arg)?;
        let mut payload = vec![self.code()];
        match arg {
            Argument::None => {}
            Argument::Int(value) => {
                let tag = if value >= 0 {
                    ARG_INT_POSITIVE
                } else {
                    ARG_INT_NEGATIVE
                };
                let magnitude = value.unsigned_abs();
                payload.push(tag);
                payload.push((magnitude & 0xFF) as u8);
                payload.push(((magnitude >> 8) & 0xFF) as u8);
            }
            Argument::Str(s) => {
                payload.push(ARG_STRING);
                payload.extend_from_slice(s.as_bytes());
                payload.push(0x00);
            }
        }
        Ok(payload)
    }

    /// Complete framed packet ready for the transport
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_packet(&self.payload()?)
    }
}

fn validate_argument(arg: &Argument) -> Result<()> {
    match arg {
        Argument::None => Ok(()),
        Argument::Int(value) => {
            if value.unsigned_abs() > MAX_INT_MAGNITUDE {
                return Err(Error::usage(format!(
                    "integer argument {} does not fit in two magnitude bytes",
                    value
                )));
            }
            Ok(())
        }
        Argument::Str(s) => {
            if !s.is_ascii() || s.bytes().any(|b| b == 0) {
                return Err(Error::usage(
                    "string argument must be ASCII without NUL bytes",
                ));
            }
            // code + tag + text + terminator
            if s.len() + 3 > MAX_PAYLOAD_SIZE {
                return Err(Error::usage(format!(
                    "string argument of {} bytes is too long",
                    s.len()
                )));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_command() {
        assert_eq!(Command::Pulse.payload().unwrap(), vec![0x00]);
        assert_eq!(Command::Stop.payload().unwrap(), vec![CMD_STOP]);
        assert_eq!(
            Command::Open.encode().unwrap(),
            vec![0xFA, 0xFB, 0x03, 0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn test_positive_int_argument() {
        // VEL 500 mm/s: tag 0x3B, 500 = 0x01F4 little-endian
        assert_eq!(
            Command::Vel(500).payload().unwrap(),
            vec![CMD_VEL, 0x3B, 0xF4, 0x01]
        );
    }

    #[test]
    fn test_negative_int_carries_sign_in_tag() {
        // Magnitude, not two's complement
        assert_eq!(
            Command::RotVel(-30).payload().unwrap(),
            vec![CMD_RVEL, 0x1B, 30, 0x00]
        );
        assert_eq!(
            Command::Move(i16::MIN).payload().unwrap(),
            vec![CMD_MOVE, 0x1B, 0x00, 0x80]
        );
    }

    #[test]
    fn test_string_argument_is_null_terminated() {
        assert_eq!(
            Command::Say("AB".into()).payload().unwrap(),
            vec![CMD_SAY, 0x2B, b'A', b'B', 0x00]
        );
    }

    #[test]
    fn test_packed_arguments() {
        assert_eq!(
            Command::DigitalOut {
                mask: 0xFF,
                values: 0x10
            }
            .argument(),
            Argument::Int(0xFF10)
        );
        assert_eq!(
            Command::Vel2 { left: 2, right: 3 }.argument(),
            Argument::Int(0x0203)
        );
        // Negative left wheel makes the packed word negative
        assert_eq!(
            Command::Vel2 { left: -1, right: 0 }.argument(),
            Argument::Int(-256)
        );
        assert_eq!(Command::Enable(false).argument(), Argument::Int(0));
        assert_eq!(Command::Sonar(true).argument(), Argument::Int(1));
    }

    #[test]
    fn test_raw_matches_typed() {
        let raw = Command::raw(CMD_VEL, Argument::Int(500)).unwrap();
        assert_eq!(raw.encode().unwrap(), Command::Vel(500).encode().unwrap());
        let raw = Command::raw(CMD_STOP, Argument::None).unwrap();
        assert_eq!(raw.encode().unwrap(), Command::Stop.encode().unwrap());
    }

    #[test]
    fn test_raw_rejects_mismatched_type() {
        assert!(matches!(
            Command::raw(CMD_VEL, Argument::Str("fast".into())),
            Err(Error::ProtocolUsage(_))
        ));
        assert!(matches!(
            Command::raw(CMD_STOP, Argument::Int(1)),
            Err(Error::ProtocolUsage(_))
        ));
        assert!(matches!(
            Command::raw(CMD_SAY, Argument::None),
            Err(Error::ProtocolUsage(_))
        ));
    }

    #[test]
    fn test_raw_rejects_unknown_code_and_bad_values() {
        assert!(matches!(
            Command::raw(200, Argument::None),
            Err(Error::ProtocolUsage(_))
        ));
        assert!(matches!(
            Command::raw(CMD_VEL, Argument::Int(70_000)),
            Err(Error::ProtocolUsage(_))
        ));
        assert!(matches!(
            Command::raw(CMD_SAY, Argument::Str("caf\u{e9}".into())),
            Err(Error::ProtocolUsage(_))
        ));
        assert!(Command::raw(CMD_DIGOUT, Argument::Int(-65535)).is_ok());
    }

    #[test]
    fn test_overlong_string_rejected_before_framing() {
        let text = "x".repeat(MAX_PAYLOAD_SIZE);
        assert!(matches!(
            Command::Say(text).encode(),
            Err(Error::ProtocolUsage(_))
        ));
    }

    #[test]
    fn test_table_covers_typed_variants() {
        let typed = [
            Command::Pulse,
            Command::Polling("1234".into()),
            Command::Enable(true),
            Command::ResetOrigin,
            Command::SetMaxVelocity(400),
            Command::RequestConfig,
            Command::Vel2 { left: 1, right: 1 },
            Command::IoRequest(2),
            Command::SoundToggle(false),
        ];
        for cmd in typed {
            assert_eq!(arg_kind(cmd.code()), Some(cmd.argument().kind()), "{:?}", cmd);
        }
    }
}
