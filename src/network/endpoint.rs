//! Connection targets decoded from tape cells.
//!
//! Six consecutive cells describe an endpoint: four address octets followed by
//! two cells whose decimal renderings are concatenated into the port literal.
//! `[127, 0, 0, 1, 80, 80]` names `127.0.0.1:8080`; `[10, 0, 0, 2, 0, 7]`
//! names `10.0.0.2:07`. The port literal is kept as text because each
//! transport kind interprets it differently (port number, protocol number, or
//! part of a socket path).

use crate::network::transport::TransportError;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;

/// Number of cells read to build an [`Endpoint`].
pub const ENDPOINT_CELLS: usize = 6;

/// Destination for the connect opcode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    octets: [u8; 4],
    port: String,
}

impl Endpoint {
    /// Creates an endpoint from address octets and a port literal.
    pub fn new(octets: [u8; 4], port: impl Into<String>) -> Self {
        Self {
            octets,
            port: port.into(),
        }
    }

    /// Decodes the six cells starting at the tape pointer.
    pub fn from_cells(cells: [u8; ENDPOINT_CELLS]) -> Self {
        let [a, b, c, d, p1, p2] = cells;
        Self::new([a, b, c, d], format!("{p1}{p2}"))
    }

    /// IPv4 address named by the first four cells.
    pub fn host(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.octets)
    }

    /// The port literal exactly as decoded.
    pub fn port_literal(&self) -> &str {
        &self.port
    }

    /// Parses the port literal as a TCP/UDP port.
    pub fn port(&self) -> Result<u16, TransportError> {
        self.port
            .parse()
            .map_err(|_| TransportError::InvalidPort(self.port.clone()))
    }

    /// Parses the port literal as an IP protocol number for raw sockets.
    pub fn protocol(&self) -> Result<u8, TransportError> {
        self.port
            .parse()
            .map_err(|_| TransportError::InvalidProtocol(self.port.clone()))
    }

    /// Socket address for the IP transports.
    pub fn socket_addr(&self) -> Result<SocketAddrV4, TransportError> {
        Ok(SocketAddrV4::new(self.host(), self.port()?))
    }

    /// The endpoint text used as a filesystem path by the local-socket transports.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(self.to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets;
        write!(f, "{a}.{b}.{c}.{d}:{}", self.port)
    }
}
