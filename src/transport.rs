// sidcan/src/transport.rs
//
// The interface between the display driver and the bus.
//
// This file is part of the Rust 'sidcan' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The bus, as seen by the display driver.

use crate::{Burst, CanFrame, TransportError};

/// Something that can put a classic CAN frame on the bus.
///
/// The [`CanSocket`](crate::CanSocket) is the real thing. A transport may
/// block for as long as the underlying device allows, which for a socket is
/// governed by its write timeout.
pub trait Transport {
    /// Sends a single frame.
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Sends all the frames of a burst, in order.
    ///
    /// Every frame is tried, even after one of them fails, so the
    /// terminator always goes out. The first failure is returned.
    fn transmit_burst(&mut self, burst: &Burst) -> Result<(), TransportError> {
        burst
            .frames()
            .map(|frame| self.transmit(&frame))
            .fold(Ok(()), |res, sent| res.and(sent))
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        (**self).transmit(frame)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        (**self).transmit(frame)
    }
}

/////////////////////////////////////////////////////////////////////////////
