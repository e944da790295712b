//! Transport kinds and first-success dialing.
//!
//! The connect opcode does not say how to reach its endpoint, so every
//! [`TransportKind`] in the configured order is tried in turn and the first
//! one that connects wins. The default order is stream, datagram, raw, then
//! the three local-socket flavours.
//!
//! | Kind         | Socket                        | Endpoint use                    |
//! |--------------|-------------------------------|---------------------------------|
//! | `tcp`        | IPv4 stream                   | `host:port`                     |
//! | `udp`        | IPv4 datagram                 | `host:port`                     |
//! | `raw`        | IPv4 raw                      | host, port literal = protocol   |
//! | `unix`       | local stream                  | whole endpoint text as a path   |
//! | `unixgram`   | local datagram                | whole endpoint text as a path   |
//! | `unixpacket` | local seqpacket               | whole endpoint text as a path   |

use crate::debug;
use crate::network::connection::{Connection, Link};
use crate::network::endpoint::Endpoint;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream, UdpSocket};
#[cfg(unix)]
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Errors that can occur while establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Port literal is not a valid 16-bit port.
    #[error("invalid port literal '{0}'")]
    InvalidPort(String),

    /// Port literal is not a valid IP protocol number.
    #[error("invalid protocol number '{0}'")]
    InvalidProtocol(String),

    /// Transport kind is not available on this platform.
    #[error("{kind} transport is not supported on this platform")]
    Unsupported { kind: TransportKind },

    /// The socket could not be created or connected.
    #[error("{kind} dial failed: {source}")]
    Io {
        kind: TransportKind,
        #[source]
        source: io::Error,
    },

    /// Every configured transport kind failed.
    #[error("no transport reached {endpoint} ({} attempts)", .attempts.len())]
    Exhausted {
        endpoint: String,
        attempts: Vec<(TransportKind, TransportError)>,
    },

    /// Name that does not match any transport kind.
    #[error("unknown transport kind '{0}'")]
    UnknownKind(String),
}

/// Socket flavour used to reach an [`Endpoint`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TransportKind {
    Tcp,
    Udp,
    Raw,
    Unix,
    UnixGram,
    UnixPacket,
}

/// Timeouts applied while dialing and on the established connection.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DialOptions {
    /// Upper bound on connecting for `tcp` and `raw`. `None` waits as long as the OS does.
    pub connect_timeout: Option<Duration>,
    /// Read and write timeout on the established socket. `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
}

impl TransportKind {
    /// Probe order used when none is configured.
    pub const DEFAULT_ORDER: [TransportKind; 6] = [
        TransportKind::Tcp,
        TransportKind::Udp,
        TransportKind::Raw,
        TransportKind::Unix,
        TransportKind::UnixGram,
        TransportKind::UnixPacket,
    ];

    /// Returns the lowercase name used in configuration.
    pub const fn name(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Udp => "udp",
            TransportKind::Raw => "raw",
            TransportKind::Unix => "unix",
            TransportKind::UnixGram => "unixgram",
            TransportKind::UnixPacket => "unixpacket",
        }
    }

    /// Returns `true` for the kinds that treat the endpoint as a filesystem path.
    pub const fn is_local(self) -> bool {
        matches!(
            self,
            TransportKind::Unix | TransportKind::UnixGram | TransportKind::UnixPacket
        )
    }

    /// Connects to `endpoint` using this transport kind only.
    pub fn dial(self, endpoint: &Endpoint, options: &DialOptions) -> Result<Connection, TransportError> {
        let link = match self {
            TransportKind::Tcp => connect_tcp(endpoint.socket_addr()?, options.connect_timeout),
            TransportKind::Udp => connect_udp(endpoint.socket_addr()?),
            TransportKind::Raw => {
                connect_raw(endpoint.host(), endpoint.protocol()?, options.connect_timeout)
            }
            TransportKind::Unix | TransportKind::UnixGram | TransportKind::UnixPacket => {
                return self.dial_path(&endpoint.path(), options);
            }
        }
        .map_err(|source| TransportError::Io { kind: self, source })?;

        self.finish(endpoint.to_string(), link, options)
    }

    /// Connects one of the local-socket kinds to `path`.
    pub(crate) fn dial_path(self, path: &Path, options: &DialOptions) -> Result<Connection, TransportError> {
        #[cfg(unix)]
        {
            let link = match self {
                TransportKind::Unix => UnixStream::connect(path).map(Link::Unix),
                TransportKind::UnixGram => connect_unixgram(path),
                TransportKind::UnixPacket => connect_unixpacket(path),
                _ => return Err(TransportError::Unsupported { kind: self }),
            }
            .map_err(|source| TransportError::Io { kind: self, source })?;

            self.finish(path.display().to_string(), link, options)
        }
        #[cfg(not(unix))]
        {
            let _ = (path, options);
            Err(TransportError::Unsupported { kind: self })
        }
    }

    fn finish(self, peer: String, link: Link, options: &DialOptions) -> Result<Connection, TransportError> {
        let connection = Connection::new(self, peer, link);
        connection
            .set_timeouts(options.io_timeout)
            .map_err(|source| TransportError::Io { kind: self, source })?;
        Ok(connection)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportKind {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportKind::Tcp),
            "udp" => Ok(TransportKind::Udp),
            "raw" | "ip" => Ok(TransportKind::Raw),
            "unix" => Ok(TransportKind::Unix),
            "unixgram" => Ok(TransportKind::UnixGram),
            "unixpacket" => Ok(TransportKind::UnixPacket),
            other => Err(TransportError::UnknownKind(other.to_string())),
        }
    }
}

/// Parses a comma-separated list of transport kinds, keeping the given order.
pub fn parse_order(list: &str) -> Result<Vec<TransportKind>, TransportError> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// Tries each kind in `order` and returns the first connection that succeeds.
///
/// # Errors
/// Returns [`TransportError::Exhausted`] with every individual failure when no
/// kind connects, including when `order` is empty.
pub fn dial(
    endpoint: &Endpoint,
    order: &[TransportKind],
    options: &DialOptions,
) -> Result<Connection, TransportError> {
    let mut attempts = Vec::with_capacity(order.len());
    for &kind in order {
        match kind.dial(endpoint, options) {
            Ok(connection) => return Ok(connection),
            Err(e) => {
                debug!("{kind} dial to {endpoint} failed: {e}");
                attempts.push((kind, e));
            }
        }
    }
    Err(TransportError::Exhausted {
        endpoint: endpoint.to_string(),
        attempts,
    })
}

fn connect_tcp(addr: SocketAddrV4, timeout: Option<Duration>) -> io::Result<Link> {
    let stream = match timeout {
        Some(t) => TcpStream::connect_timeout(&SocketAddr::V4(addr), t)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(Link::Tcp(stream))
}

fn connect_udp(addr: SocketAddrV4) -> io::Result<Link> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(addr)?;
    Ok(Link::Udp(socket))
}

fn connect_raw(host: Ipv4Addr, protocol: u8, timeout: Option<Duration>) -> io::Result<Link> {
    let socket = Socket::new(
        Domain::IPV4,
        Type::RAW,
        Some(Protocol::from(i32::from(protocol))),
    )?;
    let addr = SockAddr::from(SocketAddrV4::new(host, 0));
    match timeout {
        Some(t) => socket.connect_timeout(&addr, t)?,
        None => socket.connect(&addr)?,
    }
    Ok(Link::Socket(socket))
}

#[cfg(unix)]
fn connect_unixgram(path: &Path) -> io::Result<Link> {
    let socket = UnixDatagram::unbound()?;
    socket.connect(path)?;
    Ok(Link::UnixGram(socket))
}

#[cfg(unix)]
fn connect_unixpacket(path: &Path) -> io::Result<Link> {
    let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
    socket.connect(&SockAddr::unix(path)?)?;
    Ok(Link::Socket(socket))
}
