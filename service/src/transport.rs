//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Non-blocking socket and loopback transports
//!
//! Every operation returns immediately. "Nothing to do right now" is reported
//! as `Ok(0)` or `Ok(None)`; a closed or failed peer is an `Err`.

use crate::config::listen_address;
use crate::ring::RingBuffer;
use crate::{MuxError, Result};
use byteorder::{ByteOrder, NativeEndian, WriteBytesExt};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use tracing::{debug, trace};

/// Bytes of the length prefix on datagram loopback records.
const LOOPBACK_HEADER_LEN: usize = 4;

/// A connected peer.
#[derive(Debug)]
pub(crate) enum Connection {
    /// Byte stream
    Tcp(TcpStream),
    /// Connected datagram socket
    Udp(UdpSocket),
}

impl Connection {
    /// Wrap an accepted or connected stream.
    pub(crate) fn tcp(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Connection::Tcp(stream))
    }

    /// Bind `port` and connect to `destination` for datagram traffic.
    pub(crate) fn udp(port: &str, destination: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(listen_address(port))?;
        socket.connect(destination)?;
        socket.set_nonblocking(true)?;
        Ok(Connection::Udp(socket))
    }

    /// Read what is available.
    ///
    /// A stream closed by the peer is reported as
    /// [`io::ErrorKind::UnexpectedEof`].
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let result = match self {
            Connection::Tcp(stream) => match stream.read(buf) {
                Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                other => other,
            },
            Connection::Udp(socket) => socket.recv(buf),
        };
        match result {
            Err(e) if is_transient(&e) => Ok(0),
            other => other,
        }
    }

    /// Write as much of `buf` as the socket takes now.
    pub(crate) fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let result = match self {
            Connection::Tcp(stream) => stream.write(buf),
            Connection::Udp(socket) => socket.send(buf),
        };
        match result {
            Err(e) if is_transient(&e) => Ok(0),
            other => other,
        }
    }

    /// Address of the peer.
    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Connection::Tcp(stream) => stream.peer_addr().ok(),
            Connection::Udp(socket) => socket.peer_addr().ok(),
        }
    }

    /// Close the connection.
    pub(crate) fn close(self) {
        if let Connection::Tcp(stream) = self {
            if let Err(e) = stream.shutdown(std::net::Shutdown::Both) {
                trace!(error = %e, "shutdown on close");
            }
        }
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// `true` for errors that only mean the peer went away.
pub(crate) fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// Open a non-blocking listener.
pub(crate) fn listen(port: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(listen_address(port))?;
    listener.set_nonblocking(true)?;
    debug!(address = ?listener.local_addr().ok(), "listening");
    Ok(listener)
}

/// Accept a waiting caller, if any.
pub(crate) fn accept(listener: &TcpListener) -> io::Result<Option<(Connection, SocketAddr)>> {
    match listener.accept() {
        Ok((stream, peer)) => Ok(Some((Connection::tcp(stream)?, peer))),
        Err(e) if is_transient(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Resolve `destination` as `host:port`.
pub(crate) fn resolve(destination: &str) -> Result<Vec<SocketAddr>> {
    let addresses: Vec<SocketAddr> = destination.to_socket_addrs()?.collect();
    if addresses.is_empty() {
        return Err(MuxError::invalid(format!(
            "destination '{destination}' has no address"
        )));
    }
    Ok(addresses)
}

/// An outbound connection that may still be completing.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// Non-blocking stream connect in flight
    Pending(Socket),
    /// Usable right away
    Ready(Connection),
}

impl Outbound {
    /// Begin a non-blocking stream connect to the first address of
    /// `destination`.
    pub(crate) fn connect(destination: &str) -> io::Result<Self> {
        let address = destination
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable))?;
        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        match socket.connect(&address.into()) {
            Ok(()) => {}
            Err(e) if in_progress(&e) => trace!(%address, "connect in progress"),
            Err(e) => return Err(e),
        }
        Ok(Outbound::Pending(socket))
    }

    /// `Ok(true)` once the connection is usable; a failed connect is the error.
    pub(crate) fn is_ready(&self) -> io::Result<bool> {
        match self {
            Outbound::Ready(_) => Ok(true),
            Outbound::Pending(socket) => {
                if let Some(e) = socket.take_error()? {
                    return Err(e);
                }
                match socket.peer_addr() {
                    Ok(_) => Ok(true),
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// The established connection.
    pub(crate) fn into_connection(self) -> io::Result<Connection> {
        match self {
            Outbound::Ready(connection) => Ok(connection),
            Outbound::Pending(socket) => Connection::tcp(TcpStream::from(socket)),
        }
    }

    /// Abandon the attempt.
    pub(crate) fn close(self) {
        match self {
            Outbound::Ready(connection) => connection.close(),
            Outbound::Pending(socket) => drop(socket),
        }
    }
}

fn in_progress(error: &io::Error) -> bool {
    #[cfg(unix)]
    if error.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    error.kind() == io::ErrorKind::WouldBlock
}

/// Internal peer of a loopback line.
///
/// Transmitted bytes are held here until the receive side reads them. In
/// datagram mode each write is one record with a native-endian length prefix.
#[derive(Debug)]
pub(crate) struct LoopbackBuffer {
    ring: RingBuffer,
    datagram: bool,
}

impl LoopbackBuffer {
    pub(crate) fn new(capacity: usize, datagram: bool) -> Result<Self> {
        Ok(Self {
            ring: RingBuffer::with_capacity(capacity, 0)?,
            datagram,
        })
    }

    /// Store what fits; a datagram is stored whole or not at all.
    pub(crate) fn write(&mut self, buf: &[u8]) -> usize {
        let stored = if self.datagram {
            Self::record(buf)
                .and_then(|record| self.ring.write(&record))
                .map(|()| buf.len())
        } else {
            let count = buf.len().min(self.ring.free());
            self.ring.write(&buf[..count]).map(|()| count)
        };
        match stored {
            Ok(count) => count,
            Err(e) => {
                trace!(error = %e, bytes = buf.len(), "loopback full");
                0
            }
        }
    }

    fn record(buf: &[u8]) -> Result<Vec<u8>> {
        let length = i32::try_from(buf.len())
            .map_err(|_| MuxError::invalid(format!("datagram of {} bytes", buf.len())))?;
        let mut record = Vec::with_capacity(LOOPBACK_HEADER_LEN + buf.len());
        record.write_i32::<NativeEndian>(length)?;
        record.extend_from_slice(buf);
        Ok(record)
    }

    /// Take stored bytes, or the next whole datagram.
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.datagram {
            if self.ring.len() < LOOPBACK_HEADER_LEN {
                return Ok(0);
            }
            let mut header = [0u8; LOOPBACK_HEADER_LEN];
            for (index, byte) in header.iter_mut().enumerate() {
                *byte = self.ring.peek(index).unwrap_or(0);
            }
            let length = usize::try_from(NativeEndian::read_i32(&header)).unwrap_or(0);
            if length > buf.len() {
                return Err(MuxError::invalid(format!(
                    "loopback datagram of {length} bytes exceeds {} byte buffer",
                    buf.len()
                )));
            }
            self.ring.consume(LOOPBACK_HEADER_LEN);
            Ok(self.drain_into(&mut buf[..length]))
        } else {
            Ok(self.drain_into(buf))
        }
    }

    /// Drop everything held.
    pub(crate) fn clear(&mut self) {
        self.ring.clear();
    }

    fn drain_into(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        while count < buf.len() {
            match self.ring.pop() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_ready(outbound: &Outbound) -> io::Result<bool> {
        for _ in 0..200 {
            if outbound.is_ready()? {
                return Ok(true);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(false)
    }

    // ========================================================================
    // Loopback
    // ========================================================================

    #[test]
    fn test_stream_loopback_partial_write() {
        let mut loopback = LoopbackBuffer::new(8, false).unwrap();
        assert_eq!(loopback.write(b"0123456789"), 8);
        let mut buf = [0u8; 16];
        assert_eq!(loopback.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf[..8], b"01234567");
        assert_eq!(loopback.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_datagram_loopback_keeps_boundaries() {
        let mut loopback = LoopbackBuffer::new(64, true).unwrap();
        assert_eq!(loopback.write(b"one"), 3);
        assert_eq!(loopback.write(b"three"), 5);
        assert_eq!(loopback.ring.len(), 3 + 5 + 2 * LOOPBACK_HEADER_LEN);

        let mut buf = [0u8; 16];
        assert_eq!(loopback.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"one");
        assert_eq!(loopback.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"three");
    }

    #[test]
    fn test_datagram_loopback_all_or_nothing() {
        let mut loopback = LoopbackBuffer::new(10, true).unwrap();
        assert_eq!(loopback.write(b"1234567"), 0);
        assert_eq!(loopback.ring.len(), 0);
        assert_eq!(loopback.write(b"123456"), 6);
    }

    #[test]
    fn test_datagram_loopback_oversized_read() {
        let mut loopback = LoopbackBuffer::new(32, true).unwrap();
        loopback.write(b"0123456789");
        let mut buf = [0u8; 4];
        assert!(loopback.read(&mut buf).is_err());
    }

    // ========================================================================
    // Sockets
    // ========================================================================

    #[test]
    fn test_accept_without_caller() {
        let listener = listen("127.0.0.1:0").unwrap();
        assert!(accept(&listener).unwrap().is_none());
    }

    #[test]
    fn test_tcp_round_trip() {
        let listener = listen("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(address).unwrap();

        let mut accepted = None;
        for _ in 0..200 {
            if let Some(pair) = accept(&listener).unwrap() {
                accepted = Some(pair);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let (mut connection, _) = accepted.unwrap();

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 8];
        let mut count = 0;
        for _ in 0..200 {
            count = connection.read(&mut buf).unwrap();
            if count > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(&buf[..count], b"ping");

        drop(client);
        let mut closed = false;
        for _ in 0..200 {
            match connection.read(&mut buf) {
                Err(e) => {
                    assert!(is_disconnect(&e));
                    closed = true;
                    break;
                }
                Ok(_) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        assert!(closed);
    }

    #[test]
    fn test_outbound_connect_completes_later() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let outbound = Outbound::connect(&listener.local_addr().unwrap().to_string()).unwrap();
        assert!(matches!(outbound, Outbound::Pending(_)));
        assert!(wait_ready(&outbound).unwrap());

        let mut connection = outbound.into_connection().unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        assert_eq!(connection.write(b"hi").unwrap(), 2);
        let mut buf = [0u8; 2];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn test_outbound_connect_refused_is_reported() {
        let address = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let result = Outbound::connect(&address.to_string()).and_then(|outbound| wait_ready(&outbound));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        assert!(resolve("not an address").is_err());
        assert_eq!(resolve("127.0.0.1:23").unwrap().len(), 1);
    }
}
