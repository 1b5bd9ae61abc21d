//! Unified error types for the cooling-rig controller.
//!
//! A single crate-wide `Error` enum keeps the tick-boundary error handling
//! uniform: everything the bus, the parameter protocol or the device lock can
//! fail with funnels into one type that the workers log and recover from.
//! Hazard conditions are deliberately *not* errors — they are a latched state
//! (see `actuator::hazard`), the one genuinely fatal-to-operation path.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible bus/sensor operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The cross-process device lock could not be acquired within the timeout.
    /// Distinct from communication errors: the bus is healthy, just busy.
    LockTimeout { path: PathBuf, timeout: Duration },
    /// A frame checksum did not match. For segmented reads `expected` is 0
    /// and `actual` is the non-zero XOR residue.
    Checksum { expected: u8, actual: u8 },
    /// The device replied with something the protocol does not allow.
    Protocol(ProtocolError),
    /// A segment count that cannot be produced by a conforming device.
    /// This indicates a protocol bug rather than line noise.
    BadSegmentCount(u8),
    /// An adapter-level pin/SPI/UART failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockTimeout { path, timeout } => write!(
                f,
                "device busy: lock {} not acquired within {:.1} s",
                path.display(),
                timeout.as_secs_f64()
            ),
            Self::Checksum { expected, actual } => {
                write!(f, "checksum mismatch (expected 0x{expected:02X}, got 0x{actual:02X})")
            }
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::BadSegmentCount(n) => write!(f, "malformed segment count 0x{n:02X}"),
            Self::Io(msg) => write!(f, "I/O: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Wire protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The framed read returned fewer bytes than the reply requires.
    ShortResponse { wanted: usize, got: usize },
    /// A response header outside the set the protocol defines.
    InvalidHeader(u8),
    /// The device reported an error response (`0xC?` header).
    DeviceError(u8),
    /// The device kept answering "not ready" past the poll budget.
    WaitExhausted,
    /// The payload could not be decoded as the requested data type.
    Decode(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortResponse { wanted, got } => {
                write!(f, "response is too short ({got} of {wanted} bytes)")
            }
            Self::InvalidHeader(h) => write!(f, "invalid response header 0x{h:02X}"),
            Self::DeviceError(h) => write!(f, "device error response 0x{h:02X}"),
            Self::WaitExhausted => write!(f, "device not ready after poll budget"),
            Self::Decode(msg) => write!(f, "decode failed: {msg}"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
