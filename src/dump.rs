// sidcan/src/dump.rs
//
// Writes frames in the candump log format.
//
// This file is part of the Rust 'sidcan' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! candump format output
//!
//! Writes frames as the text log format of the `candump` utility, which is
//! part of [can-utils](https://github.com/linux-can/can-utils), instead of
//! sending them to a bus:
//!
//! ```text
//! (1735270496.916858) can0 337#45968148454C4C4F
//! (1735270496.916871) can0 357#1F01051200000000
//! ```
//!
//! The [`Writer`] is a [`Transport`], so a display driver can be pointed at
//! a terminal or a file for a dry run. The log can later be replayed onto a
//! real bus with `canplayer`.

use crate::{CanFrame, Transport, TransportError};
use embedded_can::Frame as EmbeddedFrame;
use std::{
    fmt,
    io::{self, Write},
    time::{SystemTime, UNIX_EPOCH},
};

/// One line of a candump log.
#[derive(Debug, Clone)]
pub struct CanDumpRecord<'a> {
    /// The timestamp, in microseconds since the epoch
    pub t_us: u64,
    /// The name of the device
    pub device: &'a str,
    /// The frame
    pub frame: CanFrame,
}

impl fmt::Display for CanDumpRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}.{:06}) {} {:03X}#{}",
            self.t_us / 1_000_000,
            self.t_us % 1_000_000,
            self.device,
            self.frame.raw_id(),
            hex::encode_upper(self.frame.data())
        )
    }
}

/////////////////////////////////////////////////////////////////////////////
// Writer

/// A CAN log writer.
#[derive(Debug)]
pub struct Writer<W> {
    // The underlying writer
    wtr: W,
    // The device name put on each line
    device: String,
}

impl<W: Write> Writer<W> {
    /// Creates a log writer, labelling the frames with the device name.
    pub fn new(wtr: W, device: &str) -> Self {
        Self {
            wtr,
            device: device.to_string(),
        }
    }

    /// Writes a single frame with the given timestamp.
    pub fn write_record(&mut self, t_us: u64, frame: &CanFrame) -> io::Result<()> {
        let rec = CanDumpRecord {
            t_us,
            device: &self.device,
            frame: *frame,
        };
        writeln!(self.wtr, "{}", rec)?;
        self.wtr.flush()
    }

    /// Gets a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.wtr
    }

    /// Unwraps the underlying writer.
    pub fn into_inner(self) -> W {
        self.wtr
    }
}

impl<W: Write> Transport for Writer<W> {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        let t_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        self.write_record(t_us, frame)?;
        Ok(())
    }
}

/////////////////////////////////////////////////////////////////////////////
