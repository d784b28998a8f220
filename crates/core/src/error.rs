//! Error types for the HTTP server core.

use std::fmt;

/// Errors that can occur in the server core.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Transport**: [`Socket`](Self::Socket) — socket setup or per-request
///   I/O failures, carrying a [`SocketError`] kind.
/// - **Codec**: [`Parse`](Self::Parse) — malformed HTTP requests.
/// - **Memory**: [`OutOfCapacity`](Self::OutOfCapacity) — an arena's backing
///   region is exhausted. Fatal to the owning session, never to the server.
/// - **Server**: [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying socket failure.
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// Failed to parse an HTTP request message.
    #[error("HTTP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// An arena's backing region is exhausted.
    ///
    /// The caller is not expected to recover allocation-by-allocation; the
    /// enclosing session aborts and releases the whole arena.
    #[error("arena capacity exhausted")]
    OutOfCapacity,

    /// [`Server::start`](crate::Server::start) was called on a server that
    /// is running or has already consumed its listen socket.
    #[error("server already running")]
    AlreadyRunning,
}

/// A socket operation failure, classified by which capability failed.
///
/// The kinds mirror the [`Socket`](crate::socket::Socket) contract:
/// `init` reports [`Initialization`](Self::Initialization), `bind` reports
/// [`Bind`](Self::Bind), `listen`/`accept`/`connect` report
/// [`Connection`](Self::Connection), and per-request I/O reports
/// [`Send`](Self::Send) or [`Receive`](Self::Receive).
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Socket subsystem or kernel handle setup failed.
    #[error("socket initialization failed: {0}")]
    Initialization(#[source] std::io::Error),

    /// Address invalid or in use.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// Listen, accept, or connect failed.
    #[error("connection failed: {0}")]
    Connection(#[source] std::io::Error),

    /// Could not write all bytes to the peer.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// Could not read from the peer (includes read timeouts).
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),
}

impl SocketError {
    /// Whether this error is a non-blocking "nothing pending" result rather
    /// than a real failure. The acceptor treats these as idle polls.
    pub fn is_would_block(&self) -> bool {
        self.io_kind() == std::io::ErrorKind::WouldBlock
    }

    /// Whether this error is a read/write timeout expiring.
    ///
    /// Platforms disagree on the error a timed-out blocking read reports:
    /// Unix surfaces `WouldBlock`, Windows `TimedOut`.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.io_kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        )
    }

    fn io_kind(&self) -> std::io::ErrorKind {
        match self {
            Self::Initialization(e)
            | Self::Bind(e)
            | Self::Connection(e)
            | Self::Send(e)
            | Self::Receive(e) => e.kind(),
        }
    }
}

/// Specific kind of HTTP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method Path [Version]` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` was present but not a non-negative integer.
    InvalidContentLength,
    /// `Transfer-Encoding: chunked` is not supported.
    UnsupportedTransferEncoding,
    /// Request bytes were not valid UTF-8 where text was expected.
    InvalidEncoding,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
            Self::UnsupportedTransferEncoding => write!(f, "unsupported transfer encoding"),
            Self::InvalidEncoding => write!(f, "invalid text encoding"),
        }
    }
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
