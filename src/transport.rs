// ABOUTME: The byte-stream capability a Framer needs from its transport, plus a concrete
// ABOUTME: TcpStream implementation covering vectored I/O, timeouts and pending-byte counts.

//! The byte-stream capability a [`crate::Framer`] needs from its transport, and a concrete
//! implementation over [`TcpStream`].
//!
//! The framer itself never assumes a socket; it only needs the operations in [`Transport`].
//! Swapping transports (a Unix domain socket, an in-memory pipe for tests) means implementing
//! this trait, not touching the framer.

use std::io::{self, IoSlice, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Which direction a timeout or blocking-mode change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// The capability set the packet-framing layer needs from a byte-stream transport.
///
/// Implementors report recoverable conditions (`would block`, `interrupted`, `timed out`)
/// through `std::io::Error::kind()`; the framer itself classifies those via
/// [`Transport::should_retry`] and [`Transport::was_timeout`] rather than inspecting `errno`
/// directly, so a non-socket transport (a pipe, an in-memory buffer for tests) can implement
/// this trait without depending on OS error codes.
pub trait Transport {
    /// Reads into `buf`, returning the number of bytes read. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes `buf`, returning the number of bytes actually written (may be a short write).
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Writes from multiple buffers in one call, returning the total bytes written.
    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Switches the transport between blocking and non-blocking mode.
    fn set_blocking(&mut self, blocking: bool) -> io::Result<()>;

    fn is_blocking(&self) -> bool;

    /// True if `err` represents a recoverable interruption (e.g. `EINTR`) that a caller
    /// should retry rather than treat as fatal.
    fn should_retry(&self, err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::Interrupted
    }

    /// True if `err` represents the transport timing out or, in non-blocking mode, simply
    /// not being ready yet.
    fn was_timeout(&self, err: &io::Error) -> bool {
        matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    }

    fn set_timeout(&mut self, direction: Direction, timeout: Option<Duration>) -> io::Result<()>;

    /// Bytes already buffered locally (e.g. in the kernel socket buffer) and available
    /// without blocking. Used only for diagnostics; a transport that cannot report this may
    /// return `Ok(0)`.
    fn pending(&self) -> io::Result<usize>;
}

/// A [`Transport`] over a plain TCP socket.
pub struct TcpTransport {
    stream: TcpStream,
    blocking: bool,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream, blocking: true })
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.stream.write_vectored(bufs)
    }

    fn set_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.stream.set_nonblocking(!blocking)?;
        self.blocking = blocking;
        Ok(())
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    fn set_timeout(&mut self, direction: Direction, timeout: Option<Duration>) -> io::Result<()> {
        match direction {
            Direction::Read => self.stream.set_read_timeout(timeout),
            Direction::Write => self.stream.set_write_timeout(timeout),
        }
    }

    fn pending(&self) -> io::Result<usize> {
        platform::bytes_available(&self.stream)
    }
}

#[cfg(unix)]
mod platform {
    use std::io;
    use std::net::TcpStream;
    use std::os::fd::AsRawFd;

    pub fn bytes_available(stream: &TcpStream) -> io::Result<usize> {
        let mut available: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(stream.as_raw_fd(), libc::FIONREAD, &mut available) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(available.max(0) as usize)
    }
}

#[cfg(windows)]
mod platform {
    use std::io;
    use std::net::TcpStream;
    use std::os::windows::io::AsRawSocket;
    use windows_sys::Win32::Networking::WinSock::{ioctlsocket, FIONREAD};

    pub fn bytes_available(stream: &TcpStream) -> io::Result<usize> {
        let mut available: u32 = 0;
        let rc = unsafe {
            ioctlsocket(stream.as_raw_socket() as _, FIONREAD as i32, &mut available)
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(available as usize)
    }
}
