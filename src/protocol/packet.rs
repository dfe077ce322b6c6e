//! ARCOS packet framing
//!
//! Packet format: [0xFA 0xFB] [LEN] [PAYLOAD...] [CKSUM_H] [CKSUM_L]
//!
//! `LEN` counts the payload plus the two checksum bytes. The checksum covers
//! the payload only (header and LEN are skipped) and travels big-endian.
//!
//! This module provides:
//! - `checksum`: the canonical 16-bit checksum used by both TX and RX paths
//! - `encode_packet` / `decode_packet`: whole-frame conversion
//! - `read_packet` / `read_frame`: byte-by-byte framing over a [`Transport`]

use super::constants::{
    CHECKSUM_SIZE, HEADER_SIZE, MAX_LEN_BYTE, MAX_PAYLOAD_SIZE, SYNC_BYTE_1, SYNC_BYTE_2,
};
use crate::error::{Error, Result};
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// ARCOS 16-bit checksum: big-endian word sum with XOR for odd trailing byte
///
/// The algorithm:
/// 1. Sum consecutive byte pairs as big-endian 16-bit words (wrapping)
/// 2. If an odd byte remains, XOR it into the sum
///
/// # Example
/// ```
/// use arcos_link::protocol::checksum;
///
/// assert_eq!(checksum(&[0x00, 0x02]), 0x0002);
/// assert_eq!(checksum(&[0x05]), 0x0005);
/// assert_eq!(checksum(&[0x0B, 0x3B, 0xF4, 0x01]), 0x0B3B + 0xF401);
/// ```
#[inline]
pub fn checksum(payload: &[u8]) -> u16 {
    let mut words = payload.chunks_exact(2);
    let mut sum = words
        .by_ref()
        .fold(0u16, |acc, w| acc.wrapping_add(u16::from_be_bytes([w[0], w[1]])));
    if let [odd] = words.remainder() {
        sum ^= *odd as u16;
    }
    sum
}

/// Frame a payload: header, LEN, payload, big-endian checksum
pub fn encode_packet(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::usage(format!(
            "payload of {} bytes exceeds the {} byte maximum",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }
    let crc = checksum(payload);
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
    frame.extend_from_slice(&[
        SYNC_BYTE_1,
        SYNC_BYTE_2,
        (payload.len() + CHECKSUM_SIZE) as u8,
    ]);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc.to_be_bytes());
    Ok(frame)
}

/// A frame that passed header, length and checksum validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
}

impl Packet {
    /// Payload bytes (between LEN and the checksum trailer)
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Variant discriminant: the first payload byte
    #[inline]
    pub fn discriminant(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

/// Validate a complete raw frame and extract its payload
///
/// Every failure is reported as `InvalidPacket` so callers can uniformly
/// drop the frame and keep the connection.
pub fn decode_packet(raw: &[u8]) -> Result<Packet> {
    if raw.len() < HEADER_SIZE + CHECKSUM_SIZE {
        return Err(Error::invalid(format!("frame too short: {} bytes", raw.len())));
    }
    if raw[0] != SYNC_BYTE_1 || raw[1] != SYNC_BYTE_2 {
        return Err(Error::invalid(format!(
            "header invalid: {:02X} {:02X}",
            raw[0], raw[1]
        )));
    }
    let len = raw[2];
    check_len_byte(len)?;
    if raw.len() != HEADER_SIZE + len as usize {
        return Err(Error::invalid(format!(
            "length mismatch: LEN={} but frame carries {} bytes",
            len,
            raw.len() - HEADER_SIZE
        )));
    }
    let trailer = raw.len() - CHECKSUM_SIZE;
    let payload = &raw[HEADER_SIZE..trailer];
    verify_checksum(payload, [raw[trailer], raw[trailer + 1]])?;
    Ok(Packet {
        payload: payload.to_vec(),
    })
}

/// Read one frame from the transport, byte by byte
///
/// Each byte wait is bounded by `timeout`. A header mismatch is reported
/// after the first wrong byte so the next call starts one byte later,
/// which lets the stream walk back into alignment.
pub fn read_packet<T: Transport + ?Sized>(transport: &mut T, timeout: Duration) -> Result<Packet> {
    match read_frame(transport, timeout, None)? {
        Some(raw) => decode_packet(&raw),
        None => Err(Error::Other("frame read interrupted".into())),
    }
}

/// Read the raw bytes of one frame without verifying its checksum
///
/// Returns `Ok(Some(frame))` once LEN bytes have followed a valid header,
/// so the caller knows a whole frame arrived even if it fails
/// [`decode_packet`]. `stop` is checked before every byte wait; once set
/// the read is abandoned and `Ok(None)` returned.
pub fn read_frame<T: Transport + ?Sized>(
    transport: &mut T,
    timeout: Duration,
    stop: Option<&AtomicBool>,
) -> Result<Option<Vec<u8>>> {
    let stopped = || stop.is_some_and(|flag| flag.load(Ordering::Relaxed));

    if stopped() {
        return Ok(None);
    }
    let h1 = transport.read_byte(timeout)?;
    if h1 != SYNC_BYTE_1 {
        return Err(Error::invalid(format!("header invalid: {:02X}", h1)));
    }
    if stopped() {
        return Ok(None);
    }
    let h2 = transport.read_byte(timeout)?;
    if h2 != SYNC_BYTE_2 {
        return Err(Error::invalid(format!("header invalid: FA {:02X}", h2)));
    }
    if stopped() {
        return Ok(None);
    }
    let len = transport.read_byte(timeout)?;
    check_len_byte(len)?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + len as usize);
    frame.extend_from_slice(&[h1, h2, len]);
    for _ in 0..len {
        if stopped() {
            return Ok(None);
        }
        frame.push(transport.read_byte(timeout)?);
    }
    Ok(Some(frame))
}

fn check_len_byte(len: u8) -> Result<()> {
    if (len as usize) < CHECKSUM_SIZE || len > MAX_LEN_BYTE {
        return Err(Error::invalid(format!("invalid packet length: {}", len)));
    }
    Ok(())
}

fn verify_checksum(payload: &[u8], trailer: [u8; 2]) -> Result<()> {
    let received = u16::from_be_bytes(trailer);
    let calculated = checksum(payload);
    if received != calculated {
        log::debug!(
            "CRC mismatch: received=0x{:04X}, calculated=0x{:04X}, payload_len={}",
            received,
            calculated,
            payload.len()
        );
        return Err(Error::invalid(format!(
            "received checksum 0x{:04X}, expected 0x{:04X}",
            received, calculated
        )));
    }
    Ok(())
}
