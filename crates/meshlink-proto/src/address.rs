//! Network address record carried on the wire and used for host election.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use serde::{Deserialize, Serialize};

/// IPv4 host + port.
///
/// Ordering compares the host first and the port second, which is the
/// order the host election relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Address {
    /// Size of an encoded address record (4 host bytes + 2 port bytes).
    pub const ENCODED_LEN: usize = 6;

    pub const fn new(host: Ipv4Addr, port: u16) -> Self {
        Self { host, port }
    }

    /// Build an address from a raw numeric host, e.g. `Address::from_raw(10, 100)`.
    pub fn from_raw(host: u32, port: u16) -> Self {
        Self::new(Ipv4Addr::from(host), port)
    }

    /// Dotted-decimal host, without the port.
    pub fn ip_string(&self) -> String {
        self.host.to_string()
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.host.octets());
        buf.extend_from_slice(&self.port.to_be_bytes());
    }

    pub(crate) fn decode_from(data: &[u8]) -> Option<Self> {
        if data.len() < Self::ENCODED_LEN {
            return None;
        }
        let host = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
        let port = u16::from_be_bytes([data[4], data[5]]);
        Some(Self::new(host, port))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<Address> for SocketAddrV4 {
    fn from(addr: Address) -> Self {
        SocketAddrV4::new(addr.host, addr.port)
    }
}
