// sidcan/src/lib.rs
//
// The main lib file for the 'sidcan' SID display driver.
//
// This file is part of the Rust 'sidcan' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Text output to the SID over SocketCAN.
//!
//! The SID is the information display in the dashboard. Besides its own
//! content, it accepts two rows of twelve characters of text from other
//! modules on the I-bus, which is how the parking-assist module shows its
//! messages. This crate impersonates that module: it encodes the two text
//! rows into the same CAN frames and keeps re-sending them, since the
//! display blanks the rows again when the messages stop arriving.
//!
//! # Protocol
//!
//! Every refresh is a *burst* of seven classic CAN frames. Six text frames
//! on ID `0x337` carry the characters, five at most per frame:
//!
//! ```text
//! byte 0   [ 0 | new | 0 0 0 | order(3) ]
//! byte 1   0x96
//! byte 2   [ changed | 0 0 0 0 0 | bottom | top ]
//! byte 3-7 letters, zero filled
//! ```
//!
//! The `order` field counts down from 5 to 0 over the burst and only the
//! first frame has `new` set. A fixed frame on ID `0x357` with the payload
//! `1f 01 05 12 00 00 00 00` terminates the burst.
//!
//! # Usage
//!
//! ```no_run
//! use sidcan::SidDriver;
//! use std::time::Duration;
//!
//! let sid = SidDriver::open("can0", Some(Duration::from_millis(50)))?;
//! sid.set_upper("HELLO");
//! sid.set_lower("WORLD");
//! // ...
//! sid.shutdown()?;
//! # Ok::<(), sidcan::Error>(())
//! ```
//!
//! The driver owns a background thread that re-sends the current text every
//! 200 ms. Shutting it down (or dropping it) stops that thread and leaves the
//! display blank.
//!
//! Anything that can put a [`CanFrame`] on a bus can be used in place of
//! the [`CanSocket`] by implementing [`Transport`].

// clippy: do not warn about things like "SocketCAN" inside the docs
#![allow(clippy::doc_markdown)]
#![warn(
    missing_docs,
    missing_copy_implementations,
    missing_debug_implementations,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

use std::{mem::size_of, slice};

pub use embedded_can::{self, Frame as EmbeddedFrame, Id, StandardId};

pub mod errors;
pub use errors::{ConstructionError, DecodeError, Error, Result, TransportError};

pub mod addr;
pub use addr::CanAddr;

pub mod frame;
pub use frame::CanFrame;

pub mod socket;
pub use socket::{CanSocket, ShouldRetry};

pub mod text;
pub use text::{DisplayLine, LINE_LEN};

pub mod encoder;
pub use encoder::{encode_burst, Burst, Row, TextFrame, TERMINATOR_ID, TEXT_ID};

pub mod transport;
pub use transport::Transport;

pub mod driver;
pub use driver::{DriverConfig, DriverState, RefreshStats, SidDriver};

#[cfg(feature = "dump")]
pub mod dump;

/// Standard I/O errors, as used by the sockets.
pub type IoError = std::io::Error;

/// Standard I/O error kinds.
pub type IoErrorKind = std::io::ErrorKind;

/// Standard I/O results.
pub type IoResult<T> = std::io::Result<T>;

// ===== Helper functions =====

/// Gets a byte slice for any sized variable.
///
/// Note that this should normally be unsafe, but since we're only
/// using it internally for types sent to the kernel, it's OK.
pub(crate) fn as_bytes<T: Sized>(val: &T) -> &[u8] {
    let sz = size_of::<T>();
    unsafe { slice::from_raw_parts::<'_, u8>(val as *const _ as *const u8, sz) }
}

/// Gets a mutable byte slice for any sized variable.
pub(crate) fn as_bytes_mut<T: Sized>(val: &mut T) -> &mut [u8] {
    let sz = size_of::<T>();
    unsafe { slice::from_raw_parts_mut(val as *mut _ as *mut u8, sz) }
}
