// sidcan/src/errors.rs
//
// Error types for the 'sidcan' SID display driver.
//
// This file is part of the Rust 'sidcan' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Errors for encoding, transmitting, and driving the display.
//!
//! Only a few of these ever reach an application that uses the
//! [`SidDriver`](crate::SidDriver):
//!
//! - [`Error::Open`] when the CAN interface can't be used at startup,
//! - [`Error::Spawn`] when the refresh thread can't be started,
//! - [`Error::WorkerPanicked`] from an unclean shutdown.
//!
//! Transmit failures while refreshing are logged and counted, but otherwise
//! absorbed by the refresh loop, which simply tries again on the next tick.

use crate::{ShouldRetry, LINE_LEN};
use std::{error, fmt, io};
use thiserror::Error;

/// A result that can derive from any of the crate errors.
pub type Result<T> = std::result::Result<T, Error>;

// ===== Error =====

/// Composite error for the display driver.
#[derive(Error, Debug)]
pub enum Error {
    /// A text line handed to the encoder did not have the fixed length.
    #[error("display line must be exactly {} bytes, got {len}", LINE_LEN)]
    InvalidLineLength {
        /// The length of the offending line, in bytes.
        len: usize,
    },
    /// A text line handed to the encoder contained non-ASCII characters.
    #[error("display line contains characters outside of ASCII")]
    InvalidCharacter,
    /// The CAN interface could not be opened or configured.
    #[error("can't open CAN interface '{iface}': {source}")]
    Open {
        /// The interface name, like "can0"
        iface: String,
        /// The underlying system error
        #[source]
        source: io::Error,
    },
    /// The background refresh thread could not be started.
    #[error("can't start the refresh thread: {0}")]
    Spawn(#[source] io::Error),
    /// The background refresh thread panicked.
    #[error("the refresh thread panicked")]
    WorkerPanicked,
}

// ===== TransportError =====

/// Failure to put a frame on the bus.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The frame was not accepted before the write timeout expired, or the
    /// transmit queue of a non-blocking socket is full.
    #[error("timed out sending CAN frame")]
    Timeout,
    /// Any other failure from the bus driver.
    #[error(transparent)]
    Io(io::Error),
}

impl TransportError {
    /// Determines if the failure was a (possibly transient) timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

impl From<io::Error> for TransportError {
    /// Timeouts are reported by the kernel as `EAGAIN` and friends; they are
    /// split out from the hard I/O errors here.
    fn from(err: io::Error) -> Self {
        if err.should_retry() || err.kind() == io::ErrorKind::TimedOut {
            TransportError::Timeout
        } else {
            TransportError::Io(err)
        }
    }
}

// ===== DecodeError =====

/// Error decoding a text frame payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A text frame payload must be exactly 8 bytes.
    WrongLength(usize),
    /// One of the bits that are always zero was set in the order byte.
    ReservedBits(u8),
    /// The fixed second byte was not `0x96`.
    WrongMarker(u8),
    /// The row byte did not select exactly one row, or was not marked as
    /// changed.
    InvalidRow(u8),
    /// The letters were not ASCII.
    InvalidLetters,
}

impl error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use DecodeError::*;
        match *self {
            WrongLength(n) => write!(f, "text frame has {} bytes, expected 8", n),
            ReservedBits(b) => write!(f, "reserved bits set in order byte 0x{:02X}", b),
            WrongMarker(b) => write!(f, "unexpected marker byte 0x{:02X}", b),
            InvalidRow(b) => write!(f, "invalid row byte 0x{:02X}", b),
            InvalidLetters => write!(f, "text frame letters are not ASCII"),
        }
    }
}

// ===== ConstructionError =====

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Error that occurs when creating CAN packets
pub enum ConstructionError {
    /// CAN ID was outside the range of valid IDs
    IDTooLarge,
    /// Larger payload reported than can be held in the frame.
    TooMuchData,
}

impl error::Error for ConstructionError {}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConstructionError::*;
        match *self {
            IDTooLarge => write!(f, "CAN ID too large"),
            TooMuchData => write!(f, "Payload is too large"),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
