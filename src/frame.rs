// sidcan/src/frame.rs
//
// Classic CAN 2.0 data frames for the 'sidcan' SID display driver.
//
// This file is part of the Rust 'sidcan' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN bus frames.
//!
//! The display only ever gets classic CAN 2.0 data frames with standard
//! 11-bit IDs, so that is the one type of frame modelled here. It wraps
//! the kernel's
//! [can_frame](https://docs.rs/libc/latest/libc/struct.can_frame.html) so
//! it can be written to a socket as-is.

use crate::ConstructionError;
use embedded_can::{ExtendedId, Frame as EmbeddedFrame, Id, StandardId};
use itertools::Itertools;
use libc::{can_frame, canid_t};
use std::{fmt, mem};

pub use libc::{CAN_EFF_FLAG, CAN_EFF_MASK, CAN_MAX_DLEN, CAN_RTR_FLAG, CAN_SFF_MASK};

/// Gets the canid_t value from an Id
/// If it's an extended ID, the CAN_EFF_FLAG bit is also set.
pub fn id_to_canid_t(id: impl Into<Id>) -> canid_t {
    match id.into() {
        Id::Standard(id) => id.as_raw() as canid_t,
        Id::Extended(id) => id.as_raw() | CAN_EFF_FLAG,
    }
}

/// Creates a default C `can_frame`.
/// This initializes the entire structure to zeros.
#[inline(always)]
pub fn can_frame_default() -> can_frame {
    unsafe { mem::zeroed() }
}

// ===== CanFrame =====

/// A classic CAN 2.0 data frame with up to 8 bytes of data.
///
/// This is binary compatible with the `can_frame` from libc.
/// ([ref](https://docs.rs/libc/latest/libc/struct.can_frame.html))
#[derive(Clone, Copy)]
pub struct CanFrame(can_frame);

impl CanFrame {
    /// Initializes a CAN data frame from raw parts.
    pub(crate) fn init(can_id: canid_t, data: &[u8]) -> Result<Self, ConstructionError> {
        match data.len() {
            n if n <= CAN_MAX_DLEN => {
                let mut frame = can_frame_default();
                frame.can_id = can_id;
                frame.can_dlc = n as u8;
                frame.data[..n].copy_from_slice(data);
                Ok(Self(frame))
            }
            _ => Err(ConstructionError::TooMuchData),
        }
    }

    /// Creates a frame with a standard ID and a full 8-byte payload.
    ///
    /// This is the shape of every frame the display protocol uses, and
    /// can't fail.
    pub fn with_payload(id: StandardId, data: [u8; CAN_MAX_DLEN]) -> Self {
        let mut frame = can_frame_default();
        frame.can_id = id_to_canid_t(id);
        frame.can_dlc = CAN_MAX_DLEN as u8;
        frame.data = data;
        Self(frame)
    }

    /// Creates a frame using a raw, integer CAN ID.
    ///
    /// If the `id` is <= 0x7FF, it's assumed to be a standard ID, otherwise
    /// it is created as an Extended ID.
    pub fn from_raw_id(id: u32, data: &[u8]) -> Result<Self, ConstructionError> {
        match id {
            n if n <= CAN_SFF_MASK => Self::init(n, data),
            n if n <= CAN_EFF_MASK => Self::init(n | CAN_EFF_FLAG, data),
            _ => Err(ConstructionError::IDTooLarge),
        }
    }

    /// Get the composite SocketCAN ID word, with the EFF flag
    pub fn id_word(&self) -> canid_t {
        self.0.can_id
    }

    /// Return the actual raw CAN ID (without the EFF flag)
    pub fn raw_id(&self) -> canid_t {
        let mask = if self.is_extended() {
            CAN_EFF_MASK
        } else {
            CAN_SFF_MASK
        };
        self.id_word() & mask
    }

    /// Gets the frame as the raw bytes handed to the kernel.
    pub fn as_bytes(&self) -> &[u8] {
        crate::as_bytes(&self.0)
    }
}

impl EmbeddedFrame for CanFrame {
    /// Create a new CAN 2.0 data frame
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Self::init(id_to_canid_t(id), data).ok()
    }

    /// Remote frames are never sent to the display.
    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    /// Check if frame uses 29-bit extended ID format.
    fn is_extended(&self) -> bool {
        self.0.can_id & CAN_EFF_FLAG != 0
    }

    /// Check if frame is a remote transmission request.
    fn is_remote_frame(&self) -> bool {
        false
    }

    /// Return the frame identifier.
    fn id(&self) -> Id {
        // The masks keep the raw values within range for each ID type.
        if self.is_extended() {
            Id::Extended(unsafe { ExtendedId::new_unchecked(self.raw_id()) })
        } else {
            Id::Standard(unsafe { StandardId::new_unchecked(self.raw_id() as u16) })
        }
    }

    /// Data length
    fn dlc(&self) -> usize {
        self.0.can_dlc as usize
    }

    /// A slice into the actual data. Slice will always be <= 8 bytes in length
    fn data(&self) -> &[u8] {
        &self.0.data[..(self.0.can_dlc as usize)]
    }
}

impl Default for CanFrame {
    /// The default frame has all fields and data set to zero.
    fn default() -> Self {
        Self(can_frame_default())
    }
}

impl PartialEq for CanFrame {
    fn eq(&self, other: &Self) -> bool {
        self.id_word() == other.id_word() && self.data() == other.data()
    }
}

impl Eq for CanFrame {}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CanFrame {{ ")?;
        fmt::UpperHex::fmt(self, f)?;
        write!(f, " }}")
    }
}

impl fmt::UpperHex for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{:X}#", self.raw_id())?;
        let mut parts = self.data().iter().map(|v| format!("{:02X}", v));
        write!(f, "{}", parts.join(" "))
    }
}

impl From<can_frame> for CanFrame {
    fn from(frame: can_frame) -> Self {
        Self(frame)
    }
}

impl AsRef<can_frame> for CanFrame {
    fn as_ref(&self) -> &can_frame {
        &self.0
    }
}

/////////////////////////////////////////////////////////////////////////////
