//! Byte-stream transport to the daemon.
//!
//! A transport is opened against one [`Candidate`] at a time. Sends are
//! blocking with a bounded write timeout; receives poll a non-blocking
//! socket and hand control to the host's idle hook between polls, so an
//! emulator loop keeps running while the daemon thinks.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use msav_core::Candidate;

use crate::signals;

/// Maximum bytes returned by one [`Transport::receive`].
pub const RECEIVE_BUFFER_SIZE: usize = 2048;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause used by the default idle hook.
pub const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Called on every poll that finds no data.
pub type IdleHook = Box<dyn FnMut() + Send>;

/// Outcome of one receive.
#[derive(Debug)]
pub enum Received {
    Data(Vec<u8>),
    /// Nothing arrived before the deadline; the connection may still be fine.
    Timeout,
    /// The daemon closed its end.
    Closed,
    Failed(io::Error),
}

impl Received {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Received::Closed | Received::Failed(_))
    }
}

/// Connection to the daemon over one candidate at a time.
pub trait Transport {
    /// Connect to `candidate`, closing any previous connection first.
    fn open(&mut self, candidate: &Candidate) -> io::Result<()>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Write all of `bytes`.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Wait up to `timeout` for the next packet.
    fn receive(&mut self, timeout: Duration) -> Received;
}

fn not_connected() -> io::Error {
    io::Error::new(ErrorKind::NotConnected, "transport is not open")
}

// ---------------------------------------------------------------------------
// Socket transport
// ---------------------------------------------------------------------------

enum Stream {
    #[cfg(unix)]
    Local(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    fn connect(candidate: &Candidate) -> io::Result<Self> {
        match candidate {
            Candidate::Local(path) => connect_local(path),
            Candidate::Tcp(addr) => {
                let stream = TcpStream::connect_timeout(addr, CONNECT_TIMEOUT)?;
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
        }
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Stream::Local(s) => s.set_nonblocking(nonblocking),
            Stream::Tcp(s) => s.set_nonblocking(nonblocking),
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Stream::Local(s) => s.set_write_timeout(timeout),
            Stream::Tcp(s) => s.set_write_timeout(timeout),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Stream::Local(s) => s.shutdown(Shutdown::Both),
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
        }
    }
}

#[cfg(unix)]
fn connect_local(path: &Path) -> io::Result<Stream> {
    UnixStream::connect(path).map(Stream::Local)
}

#[cfg(not(unix))]
fn connect_local(path: &Path) -> io::Result<Stream> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        format!("local sockets are not supported here: {}", path.display()),
    ))
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Stream::Local(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Stream::Local(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Stream::Local(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

/// [`Transport`] over a local domain socket or loopback TCP.
pub struct SocketTransport {
    stream: Option<Stream>,
    idle: IdleHook,
}

impl SocketTransport {
    /// Creating the first transport ignores `SIGPIPE` process-wide.
    pub fn new() -> Self {
        signals::ignore_broken_pipe();
        Self {
            stream: None,
            idle: Box::new(|| thread::sleep(IDLE_SLEEP)),
        }
    }

    /// Replace the default sleep with the host's cooperative yield.
    pub fn with_idle_hook(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.idle = Box::new(hook);
        self
    }
}

impl Default for SocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl Transport for SocketTransport {
    fn open(&mut self, candidate: &Candidate) -> io::Result<()> {
        self.close();
        let stream = Stream::connect(candidate)?;
        stream.set_write_timeout(Some(SEND_TIMEOUT))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown();
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.write_all(bytes)?;
        stream.flush()
    }

    fn receive(&mut self, timeout: Duration) -> Received {
        let Some(stream) = self.stream.as_mut() else {
            return Received::Failed(not_connected());
        };
        if let Err(err) = stream.set_nonblocking(true) {
            return Received::Failed(err);
        }

        let outcome = poll_read(stream, &mut self.idle, timeout);

        match stream.set_nonblocking(false) {
            Err(err) if !outcome.is_connection_lost() => Received::Failed(err),
            _ => outcome,
        }
    }
}

fn poll_read(stream: &mut Stream, idle: &mut IdleHook, timeout: Duration) -> Received {
    let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
    let started = Instant::now();

    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Received::Closed,
            Ok(n) => return Received::Data(buf[..n].to_vec()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => return Received::Failed(err),
        }

        if started.elapsed() >= timeout {
            return Received::Timeout;
        }
        idle();
    }
}
