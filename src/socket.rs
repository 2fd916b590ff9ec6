// canlink/src/socket.rs
//
// Implements the bus endpoint for the Rust 'canlink' library.
//
// This file is part of the Rust 'canlink' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The bus endpoint: one bound raw CAN socket for a named interface.

use crate::{
    addr::CanAddr,
    as_bytes_mut,
    errors::{Error, Result, CAN_ERR_BUSOFF, CAN_ERR_CRTL},
    filter::CanFilter,
    frame::{can_frame_default, CanFrame},
};
use libc::{c_int, c_void, socklen_t, AF_CAN};
use log::warn;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    fmt, io,
    io::Read,
    mem, ptr,
    os::unix::io::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, RawFd},
    time::Duration,
};

pub use libc::{
    CAN_MTU, CAN_RAW, CAN_RAW_ERR_FILTER, CAN_RAW_FILTER, CAN_RAW_LOOPBACK,
    CAN_RAW_RECV_OWN_MSGS, SOL_CAN_RAW,
};

/// Check an error return value for transient conditions.
///
/// Interrupted calls (`EINTR`) and would-block conditions
/// (`EAGAIN`/`EWOULDBLOCK`, which the stdlib both map to `WouldBlock`)
/// are not real failures: the operation simply has to be reissued. This
/// trait adds a `should_retry` method to `Error` and `Result` to check
/// for that condition.
pub trait ShouldRetry {
    /// Check for a transient error.
    ///
    /// If `true`, the operation should be retried rather than the error
    /// surfaced.
    fn should_retry(&self) -> bool;
}

impl ShouldRetry for io::Error {
    fn should_retry(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        )
    }
}

impl<E: fmt::Debug> ShouldRetry for io::Result<E> {
    fn should_retry(&self) -> bool {
        match *self {
            Err(ref e) => e.should_retry(),
            _ => false,
        }
    }
}

/// Writes one frame's wire image through `write_some`, reissuing the
/// remaining suffix until every byte has been accepted.
///
/// Transient errors are retried internally; any other error, or a write
/// that accepts nothing, aborts the frame.
fn write_frame_bytes<W>(mut write_some: W, mut buf: &[u8]) -> io::Result<()>
where
    W: FnMut(&[u8]) -> io::Result<usize>,
{
    while !buf.is_empty() {
        match write_some(buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "CAN socket accepted no bytes",
                ))
            }
            Ok(n) => buf = &buf[n..],
            Err(ref e) if e.should_retry() => (),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// A bus endpoint for a classic CAN 2.0 interface.
///
/// Owns one bound raw SocketCAN descriptor for a named device, created by
/// [`open`](Self::open) and released exactly once: either explicitly via
/// [`close`](Self::close), which reports the outcome, or implicitly on
/// drop.
///
/// The endpoint itself is `Send + Sync`; share it with the receive thread
/// through an `Arc`. Sequential [`send`](Self::send) calls put frames on
/// the bus in call order, but two `send`s on the *same* endpoint must not
/// race without external synchronization.
#[derive(Debug)]
pub struct CanBus {
    /// The interface name the socket is bound to
    name: String,
    /// The bound raw CAN socket
    sock: Socket,
    /// The acceptance rules installed at open time
    filters: Vec<CanFilter>,
}

impl CanBus {
    /// Opens a named CAN device, e.g. "can0" or "vcan0".
    ///
    /// Creates a raw CAN socket, resolves the device name, binds the
    /// socket to the interface and installs `filters` as the kernel
    /// acceptance rules in a single atomic call. An empty `filters` slice
    /// is the common accept-everything case, not an error.
    ///
    /// Bus-off and controller error reporting is enabled best-effort: a
    /// kernel that refuses the error filter costs a warning, not the
    /// endpoint.
    pub fn open(ifname: &str, filters: &[CanFilter]) -> Result<Self> {
        let sock = Socket::new_raw(
            Domain::from(AF_CAN),
            Type::RAW,
            Some(Protocol::from(CAN_RAW)),
        )
        .map_err(|source| Error::SocketCreation { source })?;

        let addr = CanAddr::from_iface(ifname).map_err(|source| Error::DeviceLookup {
            device: ifname.to_owned(),
            source,
        })?;

        sock.bind(&addr.into_sock_addr())
            .map_err(|source| Error::Bind {
                device: ifname.to_owned(),
                source,
            })?;

        let bus = Self {
            name: ifname.to_owned(),
            sock,
            filters: filters.to_vec(),
        };

        if let Err(err) = bus.set_error_filter(CAN_ERR_CRTL | CAN_ERR_BUSOFF) {
            warn!(
                "unable to enable error frame reporting on '{}': {}",
                bus.name, err
            );
        }

        if !filters.is_empty() {
            bus.install_filters(filters)
                .map_err(|source| Error::FilterInstall {
                    device: bus.name.clone(),
                    count: filters.len(),
                    source,
                })?;
        }

        Ok(bus)
    }

    /// The interface name this endpoint is bound to.
    pub fn device(&self) -> &str {
        &self.name
    }

    /// The acceptance rules installed when the endpoint was opened.
    ///
    /// Empty means the socket accepts every frame on the bus.
    pub fn filters(&self) -> &[CanFilter] {
        &self.filters
    }

    /// Writes a single frame to the bus.
    ///
    /// Guarantees full-frame delivery: if the transport accepts fewer
    /// bytes than the frame's wire size, the remaining suffix is written
    /// again until the whole frame is out. Interrupted and would-block
    /// conditions are retried internally; any other failure aborts the
    /// call with [`Error::Transmit`] and leaves the endpoint usable.
    pub fn send(&self, frame: &CanFrame) -> Result<()> {
        write_frame_bytes(|buf| self.sock.send(buf), frame.as_bytes()).map_err(|source| {
            Error::Transmit {
                device: self.name.clone(),
                source,
            }
        })
    }

    /// Reads a single frame from the bus.
    ///
    /// Blocks until a frame arrives unless a read timeout or nonblocking
    /// mode is set; check timeouts with [`ShouldRetry::should_retry`].
    pub fn recv_frame(&self) -> io::Result<CanFrame> {
        let mut frame = can_frame_default();
        let n = (&self.sock).read(as_bytes_mut(&mut frame))?;
        if n != CAN_MTU {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "read did not return exactly one CAN frame",
            ));
        }
        Ok(CanFrame::from(frame))
    }

    /// Closes the endpoint, releasing the socket descriptor exactly once.
    ///
    /// Taking the endpoint by value makes a second close unrepresentable.
    /// A shared endpoint must be unwrapped first (`Arc::try_unwrap`),
    /// which in turn requires the receive thread to have been joined:
    /// the cancel, join, close order the driver expects.
    pub fn close(self) -> Result<()> {
        let Self { name, sock, .. } = self;
        let fd = sock.into_raw_fd();
        if unsafe { libc::close(fd) } == -1 {
            return Err(Error::Close {
                device: name,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Sets an option on the socket.
    ///
    /// A thin, typed wrapper over `setsockopt` that avoids messing around
    /// with `*const c_void`s. Note that `val` must have exactly the type
    /// the option expects, usually `c_int`.
    fn set_socket_option<T>(&self, level: c_int, name: c_int, val: &T) -> io::Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.sock.as_raw_fd(),
                level,
                name,
                val as *const _ as *const c_void,
                mem::size_of::<T>() as socklen_t,
            )
        };

        match ret {
            0 => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Sets a collection of multiple socket options with one call.
    fn set_socket_option_mult<T>(&self, level: c_int, name: c_int, values: &[T]) -> io::Result<()> {
        let ret = if values.is_empty() {
            // can't pass in a ptr to a 0-len slice, pass a null ptr instead
            unsafe { libc::setsockopt(self.sock.as_raw_fd(), level, name, ptr::null(), 0) }
        } else {
            unsafe {
                libc::setsockopt(
                    self.sock.as_raw_fd(),
                    level,
                    name,
                    values.as_ptr().cast(),
                    mem::size_of_val(values) as socklen_t,
                )
            }
        };

        match ret {
            0 => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Pushes the full rule set to the kernel in one call.
    ///
    /// The call replaces whatever was installed before; there is no
    /// partially-applied state.
    fn install_filters(&self, filters: &[CanFilter]) -> io::Result<()> {
        self.set_socket_option_mult(SOL_CAN_RAW, CAN_RAW_FILTER, filters)
    }

    /// Sets the error mask on the socket.
    ///
    /// By default no error conditions are reported as special error
    /// frames by the socket. Enabling error conditions by setting
    /// [`ERR_MASK_ALL`](crate::ERR_MASK_ALL) or another non-empty error
    /// mask causes the socket to receive notification about the specified
    /// conditions.
    pub fn set_error_filter(&self, mask: u32) -> io::Result<()> {
        self.set_socket_option(SOL_CAN_RAW, CAN_RAW_ERR_FILTER, &mask)
    }

    /// Enable or disable loopback.
    ///
    /// By default, loopback is enabled, causing other applications that
    /// open the same CAN bus to see frames emitted by different
    /// applications on the same system.
    pub fn set_loopback(&self, enabled: bool) -> io::Result<()> {
        let loopback = c_int::from(enabled);
        self.set_socket_option(SOL_CAN_RAW, CAN_RAW_LOOPBACK, &loopback)
    }

    /// Enable or disable receiving of own frames.
    ///
    /// When loopback is enabled, this settings controls if CAN frames
    /// sent are received back immediately by the sender. Default is off.
    pub fn set_recv_own_msgs(&self, enabled: bool) -> io::Result<()> {
        let recv_own_msgs = c_int::from(enabled);
        self.set_socket_option(SOL_CAN_RAW, CAN_RAW_RECV_OWN_MSGS, &recv_own_msgs)
    }

    /// Sets the read timeout on the socket.
    ///
    /// For convenience, the result value of a timed-out read can be
    /// checked using [`ShouldRetry::should_retry`].
    pub fn set_read_timeout(&self, duration: Duration) -> io::Result<()> {
        self.sock.set_read_timeout(Some(duration))
    }

    /// Change socket to non-blocking mode or back to blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.sock.set_nonblocking(nonblocking)
    }
}

impl AsFd for CanBus {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.sock.as_fd()
    }
}

impl AsRawFd for CanBus {
    fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes() -> Vec<u8> {
        CanFrame::from_raw_id(0x100, &[1, 2, 3, 4])
            .unwrap()
            .as_bytes()
            .to_vec()
    }

    #[test]
    fn test_full_write_in_one_call() {
        let bytes = frame_bytes();
        let mut writes = 0;
        let res = write_frame_bytes(
            |buf| {
                writes += 1;
                Ok(buf.len())
            },
            &bytes,
        );
        assert!(res.is_ok());
        assert_eq!(writes, 1);
    }

    #[test]
    fn test_partial_write_reissues_exact_suffix() {
        let bytes = frame_bytes();
        let mut writes: Vec<Vec<u8>> = Vec::new();
        let res = write_frame_bytes(
            |buf| {
                writes.push(buf.to_vec());
                // accept 10 bytes first, then whatever remains
                Ok(if writes.len() == 1 { 10 } else { buf.len() })
            },
            &bytes,
        );

        assert!(res.is_ok());
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], bytes);
        assert_eq!(writes[1], bytes[10..].to_vec());
        assert_eq!(10 + writes[1].len(), CAN_MTU);
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let bytes = frame_bytes();
        let mut calls = 0;
        let res = write_frame_bytes(
            |buf| {
                calls += 1;
                match calls {
                    1 => Err(io::Error::from(io::ErrorKind::Interrupted)),
                    2 => Err(io::Error::from(io::ErrorKind::WouldBlock)),
                    _ => Ok(buf.len()),
                }
            },
            &bytes,
        );
        assert!(res.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_fatal_write_error_aborts() {
        let bytes = frame_bytes();
        let mut calls = 0;
        let res = write_frame_bytes(
            |_| {
                calls += 1;
                Err(io::Error::from_raw_os_error(libc::ENETDOWN))
            },
            &bytes,
        );
        assert_eq!(res.unwrap_err().raw_os_error(), Some(libc::ENETDOWN));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_zero_write_is_an_error() {
        let bytes = frame_bytes();
        let res = write_frame_bytes(|_| Ok(0), &bytes);
        assert_eq!(res.unwrap_err().kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_should_retry() {
        assert!(io::Error::from(io::ErrorKind::WouldBlock).should_retry());
        assert!(io::Error::from(io::ErrorKind::Interrupted).should_retry());
        assert!(io::Error::from_raw_os_error(libc::EAGAIN).should_retry());
        assert!(io::Error::from_raw_os_error(libc::EINTR).should_retry());
        assert!(!io::Error::from_raw_os_error(libc::ENETDOWN).should_retry());

        let res: io::Result<()> = Err(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(res.should_retry());
        let res: io::Result<()> = Ok(());
        assert!(!res.should_retry());
    }
}
