//! Server Information Packet (SIP) decoding
//!
//! The first payload byte selects the layout:
//!
//! - `0x32`/`0x33` standard SIP (stopped/moving): odometry, battery, flags,
//!   and a variable-length list of `(sonar number, range)` entries
//! - `0x20` CONFIGpac: null-terminated identity strings and limits
//! - `0x90` ENCODERpac: two 32-bit encoder counts
//! - `0xF0` IOpac: digital lines and a variable-length analog list
//!
//! Multi-byte integers are little-endian. Every read goes through
//! [`FieldCursor`], which reports running off the payload as `InvalidPacket`.

use super::constants::*;
use super::packet::{Packet, decode_packet};
use crate::error::{Error, Result};

/// Which SIP variant a record is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipKind {
    Standard,
    Config,
    Encoder,
    Io,
}

impl SipKind {
    pub(crate) fn index(self) -> usize {
        match self {
            SipKind::Standard => 0,
            SipKind::Config => 1,
            SipKind::Encoder => 2,
            SipKind::Io => 3,
        }
    }
}

/// One sonar entry from a standard SIP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SonarReading {
    pub number: u8,
    /// Range in mm; `SONAR_NO_READING_MM` when nothing was in range
    pub range_mm: u16,
}

/// Standard SIP: pushed every SIP cycle while the servers are open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardSip {
    /// Robot was moving when the SIP was sent (type 0x33)
    pub moving: bool,
    /// Wrapping odometry counters, mm
    pub x_pos: u16,
    pub y_pos: u16,
    /// Heading in server angle units
    pub th_pos: i16,
    /// Wheel velocities, mm/s
    pub left_vel: i16,
    pub right_vel: i16,
    /// Battery voltage in tenths of a volt
    pub battery: u8,
    /// Stall flags (bits 0, 8) and bumper bits
    pub stall_and_bumpers: u16,
    pub control: u16,
    pub flags: u16,
    pub compass: u8,
    /// Only the sonars polled since the previous SIP
    pub sonars: Vec<SonarReading>,
}

impl StandardSip {
    pub fn sonars_enabled(&self) -> bool {
        self.flags & FLAG_SONARS_ENABLED != 0
    }

    pub fn left_stalled(&self) -> bool {
        self.stall_and_bumpers & 0x0001 != 0
    }

    pub fn right_stalled(&self) -> bool {
        self.stall_and_bumpers & 0x0100 != 0
    }

    /// Front/rear bumper contact bits
    pub fn bumpers(&self) -> u8 {
        ((self.stall_and_bumpers >> 1) & 0x7F) as u8
    }

    pub fn battery_voltage(&self) -> f32 {
        self.battery as f32 / 10.0
    }
}

/// CONFIGpac: robot identity, limits and serial settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSip {
    pub robot_type: String,
    pub subtype: String,
    pub serial_number: String,
    pub four_motors: u8,
    pub rot_vel_top: u16,
    pub trans_vel_top: u16,
    pub rot_acc_top: u16,
    pub trans_acc_top: u16,
    pub pwm_max: u16,
    pub name: String,
    pub sip_cycle: u8,
    pub host_baud: u8,
    pub aux_baud: u8,
    pub gripper: u16,
    pub front_sonar: u16,
    pub rear_sonar: u8,
    /// Low battery alarm threshold, tenths of a volt
    pub low_battery: u16,
}

/// ENCODERpac: raw 32-bit wheel encoder counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSip {
    pub left: u32,
    pub right: u32,
}

/// IOpac: digital and analog IO lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSip {
    pub digital_in_count: u8,
    pub digital_in: u8,
    pub front_bumps: u8,
    pub rear_bumps: u8,
    pub irs: u8,
    pub digital_out_count: u8,
    pub digital_out: u8,
    /// Raw 10-bit analog readings
    pub analogs: Vec<u16>,
}

/// Decoded SIP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sip {
    Standard(StandardSip),
    Config(ConfigSip),
    Encoder(EncoderSip),
    Io(IoSip),
    /// Discriminant this client does not decode (e.g. a late sync echo)
    Unknown(u8),
}

impl Sip {
    pub fn kind(&self) -> Option<SipKind> {
        match self {
            Sip::Standard(_) => Some(SipKind::Standard),
            Sip::Config(_) => Some(SipKind::Config),
            Sip::Encoder(_) => Some(SipKind::Encoder),
            Sip::Io(_) => Some(SipKind::Io),
            Sip::Unknown(_) => None,
        }
    }

    /// Decode a validated packet's payload
    pub fn parse(packet: &Packet) -> Result<Sip> {
        let mut cursor = FieldCursor::new(packet.payload());
        let kind = cursor.u8()?;
        match kind {
            SIP_STANDARD_STOPPED | SIP_STANDARD_MOVING => {
                parse_standard(&mut cursor, kind == SIP_STANDARD_MOVING).map(Sip::Standard)
            }
            SIP_CONFIG => parse_config(&mut cursor).map(Sip::Config),
            SIP_ENCODER => parse_encoder(&mut cursor).map(Sip::Encoder),
            SIP_IO => parse_io(&mut cursor).map(Sip::Io),
            other => Ok(Sip::Unknown(other)),
        }
    }
}

/// Validate a raw frame and decode it into a SIP
pub fn decode_sip(raw: &[u8]) -> Result<Sip> {
    Sip::parse(&decode_packet(raw)?)
}

fn parse_standard(c: &mut FieldCursor<'_>, moving: bool) -> Result<StandardSip> {
    let x_pos = c.u16()?;
    let y_pos = c.u16()?;
    let th_pos = c.i16()?;
    let left_vel = c.i16()?;
    let right_vel = c.i16()?;
    let battery = c.u8()?;
    let stall_and_bumpers = c.u16()?;
    let control = c.u16()?;
    let flags = c.u16()?;
    let compass = c.u8()?;
    let count = c.u8()?;
    let mut sonars = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let number = c.u8()?;
        let range_mm = c.u16()?;
        sonars.push(SonarReading { number, range_mm });
    }
    Ok(StandardSip {
        moving,
        x_pos,
        y_pos,
        th_pos,
        left_vel,
        right_vel,
        battery,
        stall_and_bumpers,
        control,
        flags,
        compass,
        sonars,
    })
}

fn parse_config(c: &mut FieldCursor<'_>) -> Result<ConfigSip> {
    Ok(ConfigSip {
        robot_type: c.cstr()?,
        subtype: c.cstr()?,
        serial_number: c.cstr()?,
        four_motors: c.u8()?,
        rot_vel_top: c.u16()?,
        trans_vel_top: c.u16()?,
        rot_acc_top: c.u16()?,
        trans_acc_top: c.u16()?,
        pwm_max: c.u16()?,
        name: c.cstr()?,
        sip_cycle: c.u8()?,
        host_baud: c.u8()?,
        aux_baud: c.u8()?,
        gripper: c.u16()?,
        front_sonar: c.u16()?,
        rear_sonar: c.u8()?,
        low_battery: c.u16()?,
    })
}

fn parse_encoder(c: &mut FieldCursor<'_>) -> Result<EncoderSip> {
    // Each count is two little-endian words, low word first
    let left_lo = c.u16()? as u32;
    let left_hi = c.u16()? as u32;
    let right_lo = c.u16()? as u32;
    let right_hi = c.u16()? as u32;
    Ok(EncoderSip {
        left: (left_hi << 16) | left_lo,
        right: (right_hi << 16) | right_lo,
    })
}

fn parse_io(c: &mut FieldCursor<'_>) -> Result<IoSip> {
    let digital_in_count = c.u8()?;
    let digital_in = c.u8()?;
    let front_bumps = c.u8()?;
    let rear_bumps = c.u8()?;
    let irs = c.u8()?;
    let digital_out_count = c.u8()?;
    let digital_out = c.u8()?;
    let analog_count = c.u8()?;
    let analogs = (0..analog_count)
        .map(|_| c.u16())
        .collect::<Result<Vec<_>>>()?;
    Ok(IoSip {
        digital_in_count,
        digital_in,
        front_bumps,
        rear_bumps,
        irs,
        digital_out_count,
        digital_out,
        analogs,
    })
}

/// Bounds-checked reader over a SIP payload
pub struct FieldCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let Some(bytes) = self.data.get(self.pos..end) else {
            return Err(Error::invalid(format!(
                "SIP field at offset {} runs past {} byte payload",
                self.pos,
                self.data.len()
            )));
        };
        self.pos = end;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    /// Null-terminated string; the terminator is consumed
    pub fn cstr(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            return Err(Error::invalid(format!(
                "unterminated string at offset {}",
                self.pos
            )));
        };
        let text = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(text)
    }
}
