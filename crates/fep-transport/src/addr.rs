//! A structured, loggable socket address independent of `std::net`'s own
//! `SocketAddr` so a test double can report an address without binding a
//! real socket.
use std::fmt;
use std::net::SocketAddr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransportSocketAddr {
    pub host: std::net::IpAddr,
    pub port: u16,
}

impl TransportSocketAddr {
    pub fn new(host: std::net::IpAddr, port: u16) -> Self {
        Self { host, port }
    }
}

impl From<SocketAddr> for TransportSocketAddr {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for TransportSocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
