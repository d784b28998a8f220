//! TCP implementation of the [`Socket`] contract over std and socket2.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::time::Duration;

use socket2::{Domain, Protocol, Type};

use super::Socket;
use crate::error::SocketError;

/// A TCP socket in one of its lifecycle roles.
///
/// Freshly constructed it is inert; `init` creates the kernel handle;
/// `bind` + `listen` turn it into a non-blocking listener, or `connect`
/// into a client connection. Sockets returned by `accept` are already
/// connected, blocking, with `TCP_NODELAY` set.
#[derive(Default)]
pub struct TcpSocket {
    /// Raw handle between `init` and role assignment; the listener keeps it.
    raw: Option<socket2::Socket>,
    /// Connected stream once accepting/connecting hands us a peer.
    stream: Option<TcpStream>,
}

impl TcpSocket {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_stream(stream: TcpStream) -> Self {
        Self {
            raw: None,
            stream: Some(stream),
        }
    }

    fn parse_addr(address: &str, port: u16) -> Result<SocketAddrV4, SocketError> {
        let ip: Ipv4Addr = address.parse().map_err(|_| {
            SocketError::Bind(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not an IPv4 dotted-quad address: {address:?}"),
            ))
        })?;
        Ok(SocketAddrV4::new(ip, port))
    }

    fn raw_or_uninit(&mut self) -> Result<&socket2::Socket, SocketError> {
        self.raw.as_ref().ok_or_else(|| {
            SocketError::Initialization(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket not initialized",
            ))
        })
    }

    fn stream_or_closed(&mut self) -> Result<&mut TcpStream, SocketError> {
        self.stream.as_mut().ok_or_else(|| {
            SocketError::Receive(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket not connected",
            ))
        })
    }
}

impl Socket for TcpSocket {
    fn init(&mut self) -> Result<(), SocketError> {
        if self.raw.is_some() || self.stream.is_some() {
            return Ok(());
        }
        let sock = socket2::Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(SocketError::Initialization)?;
        sock.set_reuse_address(true)
            .map_err(SocketError::Initialization)?;
        sock.set_nodelay(true).map_err(SocketError::Initialization)?;
        self.raw = Some(sock);
        Ok(())
    }

    fn bind(&mut self, address: &str, port: u16) -> Result<(), SocketError> {
        let addr = Self::parse_addr(address, port)?;
        let sock = self.raw_or_uninit()?;
        sock.bind(&SocketAddr::V4(addr).into())
            .map_err(SocketError::Bind)
    }

    fn listen(&mut self, backlog: u32) -> Result<(), SocketError> {
        let sock = self.raw_or_uninit()?;
        sock.listen(backlog.min(i32::MAX as u32) as i32)
            .map_err(SocketError::Connection)?;
        // Non-blocking accepts let the acceptor poll the shutdown flag.
        sock.set_nonblocking(true).map_err(SocketError::Connection)
    }

    fn accept(&mut self) -> Result<Box<dyn Socket>, SocketError> {
        let sock = self.raw_or_uninit()?;
        let (peer, _addr) = sock.accept().map_err(SocketError::Connection)?;
        peer.set_nonblocking(false).map_err(SocketError::Connection)?;
        peer.set_nodelay(true).map_err(SocketError::Connection)?;
        Ok(Box::new(Self::from_stream(peer.into())))
    }

    fn connect(&mut self, address: &str, port: u16) -> Result<(), SocketError> {
        let addr = Self::parse_addr(address, port)?;
        let sock = self.raw.take().ok_or_else(|| {
            SocketError::Initialization(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket not initialized",
            ))
        })?;
        match sock.connect(&SocketAddr::V4(addr).into()) {
            Ok(()) => {
                self.stream = Some(sock.into());
                Ok(())
            }
            Err(e) => Err(SocketError::Connection(e)),
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), SocketError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| {
                SocketError::Send(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "socket not connected",
                ))
            })?;
        // write_all loops over short writes, so a success means every byte
        // reached the kernel.
        stream.write_all(data).map_err(SocketError::Send)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, SocketError> {
        let stream = self.stream_or_closed()?;
        stream.read(buf).map_err(SocketError::Receive)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), SocketError> {
        let stream = self.stream_or_closed()?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(SocketError::Receive)?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(SocketError::Send)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.raw = None;
    }
}
