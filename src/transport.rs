//! Byte transport abstraction
//!
//! The engine reads and writes frames through the [`Transport`] trait; the
//! concrete transport decides whether those bytes cross plain TCP or TLS.
//! [`TcpTransport`] waits for readiness with poll(2) so caller-supplied
//! timeouts apply to every read and write; the frame/HPACK/flow-control
//! layers above are timeout-agnostic.

use crate::error::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Readiness events for polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
}

/// A byte-oriented transport the connection drives
pub trait Transport {
    /// Read into `buf`, blocking up to the transport's timeout.
    /// Returns 0 at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write from `buf`, blocking up to the transport's timeout.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Close the transport
    fn close(&mut self) -> Result<()>;

    /// Write all of `buf`
    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}

/// Wait for readiness on a file descriptor via poll(2)
pub(crate) fn poll_fd(fd: i32, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout.map(|d| d.as_millis() as i32).unwrap_or(-1);

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };
    if result < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(result > 0)
}

/// Plain TCP transport with poll-based timeouts
pub struct TcpTransport {
    stream: TcpStream,
    timeout: Option<Duration>,
}

impl TcpTransport {
    /// Connect to `addr`, bounding the connect itself by `timeout`.
    ///
    /// Nagle is disabled: frames are small and latency-sensitive.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Option<Duration>) -> Result<Self> {
        let addr: SocketAddr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::NotFound, "no address")))?;

        let domain = Domain::for_address(addr);
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        match timeout {
            Some(t) => socket.connect_timeout(&addr.into(), t)?,
            None => socket.connect(&addr.into())?,
        }
        socket.set_nodelay(true)?;

        Ok(TcpTransport {
            stream: socket.into(),
            timeout,
        })
    }

    /// Wrap an already-connected stream
    pub fn from_stream(stream: TcpStream) -> Self {
        TcpTransport {
            stream,
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Set the per-operation timeout (None = block forever)
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Current per-operation timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !poll_fd(self.stream.as_raw_fd(), PollEvents::Read, self.timeout)? {
            return Err(Error::Timeout);
        }
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !poll_fd(self.stream.as_raw_fd(), PollEvents::Write, self.timeout)? {
            return Err(Error::Timeout);
        }
        self.stream.write(buf).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        use std::net::Shutdown;
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // A peer that already closed is not an error during teardown
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }
}
