//! Stream-socket abstraction consumed by the server core.
//!
//! The core never touches the OS socket API directly — the acceptor and the
//! session workers drive everything through the [`Socket`] trait, and tests
//! can substitute their own implementation. [`TcpSocket`] is the shipped
//! std/socket2 implementation.
//!
//! One trait covers both roles a socket can play:
//!
//! - **Listener**: `init` → `bind` → `listen` → `accept` in a loop.
//! - **Connection**: the socket `accept` returns (or `connect` produces),
//!   driven with `send`/`receive` under a read/write timeout.
//!
//! Receive buffers are carved from the calling session's arena and passed
//! in, which keeps every byte of request data inside the arena that owns it.

pub mod tcp;

pub use tcp::TcpSocket;

use std::time::Duration;

use crate::error::SocketError;

/// Default read/write timeout applied to accepted connections.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(60);

/// Capability contract for a stream socket.
///
/// Error kinds are fixed per operation: `init` fails with
/// [`SocketError::Initialization`], `bind` with [`SocketError::Bind`],
/// `listen`/`accept`/`connect` with [`SocketError::Connection`], and I/O
/// with [`SocketError::Send`] / [`SocketError::Receive`].
pub trait Socket: Send {
    /// Prepare the kernel handle. Idempotent.
    fn init(&mut self) -> Result<(), SocketError>;

    /// Bind to an IPv4 dotted-quad address and port.
    fn bind(&mut self, address: &str, port: u16) -> Result<(), SocketError>;

    /// Start listening with the given backlog.
    fn listen(&mut self, backlog: u32) -> Result<(), SocketError>;

    /// Accept one pending connection, returning a socket that owns it.
    ///
    /// Listeners run non-blocking so callers can observe shutdown between
    /// attempts; "nothing pending" surfaces as a `Connection` error for
    /// which [`SocketError::is_would_block`] is true.
    fn accept(&mut self) -> Result<Box<dyn Socket>, SocketError>;

    /// Connect to a remote IPv4 address and port (client side).
    fn connect(&mut self, address: &str, port: u16) -> Result<(), SocketError>;

    /// Send all of `data`. Implementations loop until every byte is written
    /// or an error occurs — a short write is never reported as success.
    fn send(&mut self, data: &[u8]) -> Result<(), SocketError>;

    /// Read up to `buf.len()` bytes. `Ok(0)` signals orderly shutdown by the
    /// peer. Blocks up to the configured timeout.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, SocketError>;

    /// Apply a read and write timeout to the connection.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), SocketError>;

    /// Release the kernel handle. Idempotent.
    fn close(&mut self);
}
