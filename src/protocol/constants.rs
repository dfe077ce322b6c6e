//! Constants for the ARCOS client/server protocol

// Header bytes
pub const SYNC_BYTE_1: u8 = 0xFA;
pub const SYNC_BYTE_2: u8 = 0xFB;

/// Header (2) + LEN (1)
pub const HEADER_SIZE: usize = 3;
/// Checksum trailer (2)
pub const CHECKSUM_SIZE: usize = 2;

/// Largest LEN byte the server ever sends; anything above is line noise
pub const MAX_LEN_BYTE: u8 = 249;
/// Largest payload that fits under `MAX_LEN_BYTE`
pub const MAX_PAYLOAD_SIZE: usize = MAX_LEN_BYTE as usize - CHECKSUM_SIZE;

// Synchronization discriminants, sent in order; each is echoed back
pub const SYNC0: u8 = 0x00;
pub const SYNC1: u8 = 0x01;
pub const SYNC2: u8 = 0x02; // Reply carries robot name/class/subclass

// Command codes
pub const CMD_PULSE: u8 = 0; // Reset server watchdog
pub const CMD_OPEN: u8 = 1; // Start up servers
pub const CMD_CLOSE: u8 = 2; // Close servers and client connection
pub const CMD_POLLING: u8 = 3; // Change sonar polling sequence (str)
pub const CMD_ENABLE: u8 = 4; // 1 = enable motors, 0 = disable
pub const CMD_SETA: u8 = 5; // Translation accel (+) / decel (-), mm/s^2
pub const CMD_SETV: u8 = 6; // Maximum translation velocity, mm/s
pub const CMD_SETO: u8 = 7; // Reset local position to origin
pub const CMD_MOVE: u8 = 8; // Translate +/- mm at SETV speed
pub const CMD_ROTATE: u8 = 9; // Rotate +/- deg/s limited by SETRV
pub const CMD_SETRV: u8 = 10; // Maximum rotation velocity, deg/s
pub const CMD_VEL: u8 = 11; // Translate at +/- mm/s
pub const CMD_HEAD: u8 = 12; // Turn to absolute heading, deg
pub const CMD_DHEAD: u8 = 13; // Turn relative to current heading, deg
pub const CMD_SAY: u8 = 15; // Duration/tone pairs for the piezo (str)
pub const CMD_JOYREQUEST: u8 = 17; // Joystick SIPs: 1 one, >1 stream, 0 stop
pub const CMD_CONFIG: u8 = 18; // Request a CONFIGpac SIP
pub const CMD_ENCODER: u8 = 19; // Encoder SIPs: 1 one, >1 stream, 0 stop
pub const CMD_RVEL: u8 = 21; // Rotate at +/- deg/s
pub const CMD_DCHEAD: u8 = 22; // Adjust heading relative to last setpoint
pub const CMD_SETRA: u8 = 23; // Rotation accel (+) / decel (-), deg/s^2
pub const CMD_SONAR: u8 = 28; // 1 = enable, 0 = disable all sonars
pub const CMD_STOP: u8 = 29; // Stop without disabling motors
pub const CMD_DIGOUT: u8 = 30; // User outputs: bits 8-15 mask, bits 0-7 values
pub const CMD_VEL2: u8 = 32; // Independent wheel velocities, 20 mm/s units
pub const CMD_IOREQUEST: u8 = 40; // IO SIPs: 1 one, 2 stream, 0 stop
pub const CMD_SOUNDTOG: u8 = 92; // Toggle sound

// Argument tag bytes (sign travels in the tag, magnitude is absolute)
pub const ARG_INT_POSITIVE: u8 = 0x3B;
pub const ARG_INT_NEGATIVE: u8 = 0x1B;
pub const ARG_STRING: u8 = 0x2B;

/// Largest magnitude an integer argument can carry (two magnitude bytes)
pub const MAX_INT_MAGNITUDE: u32 = 0xFFFF;

// SIP type discriminants (payload byte 0)
pub const SIP_STANDARD_STOPPED: u8 = 0x32;
pub const SIP_STANDARD_MOVING: u8 = 0x33;
pub const SIP_CONFIG: u8 = 0x20;
pub const SIP_ENCODER: u8 = 0x90;
pub const SIP_IO: u8 = 0xF0;

/// Standard SIP FLAGS bit set while the sonars are enabled
pub const FLAG_SONARS_ENABLED: u16 = 0x0002;

/// Sonar range reported when nothing was in range
pub const SONAR_NO_READING_MM: u16 = 5000;
/// Number of sonar slots the server can address
pub const MAX_SONARS: usize = 32;

/// Remote watchdog window; heartbeats must be materially faster
pub const WATCHDOG_WINDOW_MS: u64 = 2000;
