//! Error types for siobridge-core
//!
//! This module provides a no_std compatible error type. Note that bus-level
//! outcomes (slave NAK, arbitration loss, ...) are not errors: they are
//! reported to the host as a [`crate::protocol::ResponseCode`] in the
//! response packet. `Error` covers malformed input and API misuse only.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Packet is too short to carry a request header, or its declared
    /// length is inconsistent with its payload
    MalformedPacket,
    /// Opcode does not fall into any known family range
    UnknownOpcode,
    /// Packet exceeds the fixed transport packet size
    PacketTooLarge,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedPacket => write!(f, "malformed request packet"),
            Self::UnknownOpcode => write!(f, "opcode outside all known families"),
            Self::PacketTooLarge => write!(f, "packet exceeds transport packet size"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
