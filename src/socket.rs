// sidcan/src/socket.rs
//
// The SocketCAN raw socket used to reach the display.
//
// This file is part of the Rust 'sidcan' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Implementation of a raw CAN 2.0 socket for SocketCAN on Linux.
//!
//! The display driver only ever writes to the bus, so this is a write-side
//! socket: it can be configured with a write timeout and it drops all
//! incoming traffic instead of queueing it.

use crate::{CanAddr, CanFrame, IoError, IoErrorKind, IoResult, Transport, TransportError};
use libc::{socklen_t, AF_CAN, EINPROGRESS};
use socket2::SockAddr;
use std::{
    fmt,
    io::Write,
    mem,
    os::{
        raw::{c_int, c_void},
        unix::io::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd},
    },
    ptr,
    time::Duration,
};

pub use libc::{CAN_RAW, CAN_RAW_FILTER, CAN_RAW_LOOPBACK, SOL_CAN_RAW};

/// Check an error return value for timeouts.
///
/// Due to the fact that timeouts are reported as errors, a write on a
/// socket with a timeout whose frame doesn't get queued in time will
/// result in an error being returned. This trait adds a `should_retry`
/// method to `Error` and `Result` to check for this condition.
pub trait ShouldRetry {
    /// Check for timeout
    ///
    /// If `true`, the error is probably due to a timeout.
    fn should_retry(&self) -> bool;
}

impl ShouldRetry for IoError {
    fn should_retry(&self) -> bool {
        match self.kind() {
            // EAGAIN, EINPROGRESS and EWOULDBLOCK are the three possible codes
            // returned when a timeout occurs. the stdlib already maps EAGAIN
            // and EWOULDBLOCK os WouldBlock
            IoErrorKind::WouldBlock => true,
            // however, EINPROGRESS is also valid
            IoErrorKind::Other => {
                matches!(self.raw_os_error(), Some(errno) if errno == EINPROGRESS)
            }
            _ => false,
        }
    }
}

impl<E: fmt::Debug> ShouldRetry for IoResult<E> {
    fn should_retry(&self) -> bool {
        match *self {
            Err(ref e) => e.should_retry(),
            _ => false,
        }
    }
}

// ===== Private local helper functions =====

/// Tries to open a raw CAN socket bound to the address.
fn raw_open_socket(addr: &CanAddr) -> IoResult<socket2::Socket> {
    let af_can = socket2::Domain::from(AF_CAN);
    let can_raw = socket2::Protocol::from(CAN_RAW);

    let sock = socket2::Socket::new_raw(af_can, socket2::Type::RAW, Some(can_raw))?;
    sock.bind(&SockAddr::from(*addr))?;
    Ok(sock)
}

// ===== CanSocket =====

/// A socket for classic CAN 2.0 devices.
///
/// It wraps a Linux socket descriptor to a Raw SocketCAN socket, and is
/// closed automatically when dropped.
#[allow(missing_copy_implementations)]
#[derive(Debug)]
pub struct CanSocket(socket2::Socket);

impl CanSocket {
    /// Open a named CAN device.
    ///
    /// Usually the more common case, opens a socket can device by name, such
    /// as "can0", "vcan0", or "slcan0".
    pub fn open(ifname: &str) -> IoResult<Self> {
        let addr = CanAddr::from_iface(ifname)?;
        Self::open_addr(&addr)
    }

    /// Open CAN device by interface number.
    pub fn open_iface(ifindex: u32) -> IoResult<Self> {
        Self::open_addr(&CanAddr::new(ifindex))
    }

    /// Open a CAN socket by address.
    pub fn open_addr(addr: &CanAddr) -> IoResult<Self> {
        raw_open_socket(addr).map(Self)
    }

    /// Gets a shared reference to the underlying socket object
    pub fn as_raw_socket(&self) -> &socket2::Socket {
        &self.0
    }

    /// Change socket to non-blocking mode or back to blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> IoResult<()> {
        self.0.set_nonblocking(nonblocking)
    }

    /// Gets the write timeout on the socket, if any.
    pub fn write_timeout(&self) -> IoResult<Option<Duration>> {
        self.0.write_timeout()
    }

    /// Sets the write timeout on the socket
    ///
    /// If the duration is set to `None` then write calls will block
    /// indefinitely.
    pub fn set_write_timeout<D>(&self, duration: D) -> IoResult<()>
    where
        D: Into<Option<Duration>>,
    {
        self.0.set_write_timeout(duration.into())
    }

    /// Writes a single frame to the bus.
    ///
    /// Note that this function can fail with an `EAGAIN` error or similar
    /// when the write timeout expires or the transmit queue is full.
    pub fn write_frame(&self, frame: &CanFrame) -> IoResult<()> {
        (&self.0).write_all(frame.as_bytes())
    }

    /// Sets an option on the socket.
    ///
    /// Note that the `val` parameter must be specified correctly; if an option
    /// expects an integer, it is advisable to pass in a `c_int`, not the default
    /// of `i32`.
    pub fn set_socket_option<T>(&self, level: c_int, name: c_int, val: &T) -> IoResult<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                level,
                name,
                val as *const _ as *const c_void,
                mem::size_of::<T>() as socklen_t,
            )
        };

        match ret {
            0 => Ok(()),
            _ => Err(IoError::last_os_error()),
        }
    }

    /// Disable reception of CAN frames.
    ///
    /// Sets a completely empty filter; disabling all CAN frame reception.
    /// The display driver never reads, so this keeps the kernel from
    /// queueing bus traffic on the socket.
    pub fn set_filter_drop_all(&self) -> IoResult<()> {
        // can't pass in a ptr to a 0-len slice, pass a null ptr instead
        let ret =
            unsafe { libc::setsockopt(self.as_raw_fd(), SOL_CAN_RAW, CAN_RAW_FILTER, ptr::null(), 0) };

        match ret {
            0 => Ok(()),
            _ => Err(IoError::last_os_error()),
        }
    }

    /// Enable or disable loopback.
    ///
    /// By default, loopback is enabled, causing other applications that open
    /// the same CAN bus to see frames emitted by different applications on
    /// the same system.
    pub fn set_loopback(&self, enabled: bool) -> IoResult<()> {
        let loopback = c_int::from(enabled);
        self.set_socket_option(SOL_CAN_RAW, CAN_RAW_LOOPBACK, &loopback)
    }
}

impl Transport for CanSocket {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        self.write_frame(frame).map_err(TransportError::from)
    }
}

impl AsRawFd for CanSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl From<OwnedFd> for CanSocket {
    fn from(fd: OwnedFd) -> Self {
        Self(socket2::Socket::from(fd))
    }
}

impl IntoRawFd for CanSocket {
    fn into_raw_fd(self) -> RawFd {
        self.0.into_raw_fd()
    }
}

impl AsFd for CanSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

/////////////////////////////////////////////////////////////////////////////
