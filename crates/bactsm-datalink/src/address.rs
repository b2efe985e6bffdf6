use core::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Where a peer sits on the data link. Transactions are keyed on it, so it
/// must compare and hash by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataLinkAddress {
    Ip(SocketAddr),
}

impl DataLinkAddress {
    pub const BACNET_IP_DEFAULT_PORT: u16 = 47808;

    pub fn local_broadcast(port: u16) -> Self {
        Self::Ip(SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port))
    }

    pub fn bacnet_default(addr: IpAddr) -> Self {
        Self::Ip(SocketAddr::new(addr, Self::BACNET_IP_DEFAULT_PORT))
    }

    pub fn as_socket_addr(self) -> SocketAddr {
        match self {
            Self::Ip(addr) => addr,
        }
    }

    pub fn is_broadcast(self) -> bool {
        matches!(self.as_socket_addr().ip(), IpAddr::V4(v4) if v4.is_broadcast())
    }
}

impl From<SocketAddr> for DataLinkAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::Ip(addr)
    }
}

impl fmt::Display for DataLinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(addr) => write!(f, "{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DataLinkAddress;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn default_port_and_broadcast() {
        let addr = DataLinkAddress::bacnet_default(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)));
        assert_eq!(addr.to_string(), "10.0.0.9:47808");
        assert!(!addr.is_broadcast());
        assert!(DataLinkAddress::local_broadcast(47808).is_broadcast());
    }
}
