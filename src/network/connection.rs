//! An established link carrying the VM's byte I/O.

use crate::debug;
use crate::network::transport::TransportKind;
use crate::utils::io::read_one;
use socket2::Socket;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, UdpSocket};
#[cfg(unix)]
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::time::Duration;

/// Underlying socket of a [`Connection`].
#[derive(Debug)]
pub(crate) enum Link {
    Tcp(TcpStream),
    Udp(UdpSocket),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(unix)]
    UnixGram(UnixDatagram),
    /// Raw IPv4 and seqpacket sockets, which std does not expose.
    Socket(Socket),
}

/// A connected socket that reads and writes one byte at a time.
///
/// Datagram links send one datagram per byte and read the first byte of each
/// received datagram.
#[derive(Debug)]
pub struct Connection {
    kind: TransportKind,
    peer: String,
    link: Link,
}

impl Connection {
    pub(crate) fn new(kind: TransportKind, peer: String, link: Link) -> Self {
        Self { kind, peer, link }
    }

    /// Transport kind that established this connection.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// The endpoint this connection was dialed to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Applies `timeout` to both reads and writes. `None` blocks indefinitely.
    pub(crate) fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        match &self.link {
            Link::Tcp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            Link::Udp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            Link::Unix(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            Link::UnixGram(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            Link::Socket(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }

    /// Sends a single byte.
    pub fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let buf = [byte];
        match &mut self.link {
            Link::Tcp(s) => s.write_all(&buf),
            Link::Udp(s) => s.send(&buf).map(drop),
            #[cfg(unix)]
            Link::Unix(s) => s.write_all(&buf),
            #[cfg(unix)]
            Link::UnixGram(s) => s.send(&buf).map(drop),
            Link::Socket(s) => s.send(&buf).map(drop),
        }
    }

    /// Receives a single byte. `None` means the peer closed the stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        match &mut self.link {
            Link::Tcp(s) => read_one(|buf| s.read(buf)),
            Link::Udp(s) => read_one(|buf| s.recv(buf)),
            #[cfg(unix)]
            Link::Unix(s) => read_one(|buf| s.read(buf)),
            #[cfg(unix)]
            Link::UnixGram(s) => read_one(|buf| s.recv(buf)),
            Link::Socket(s) => read_one(|buf| s.read(buf)),
        }
    }

    /// Shuts the link down in both directions and releases the socket.
    pub fn close(self) {
        // Raw sockets reject shutdown; dropping the link still releases them.
        let result = match &self.link {
            Link::Tcp(s) => s.shutdown(Shutdown::Both),
            Link::Udp(_) => Ok(()),
            #[cfg(unix)]
            Link::Unix(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Link::UnixGram(_) => Ok(()),
            Link::Socket(s) => s.shutdown(Shutdown::Both),
        };
        if let Err(e) = result {
            debug!("shutdown of {} link to {} failed: {e}", self.kind, self.peer);
        }
    }
}
