use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol};

/// Address family of an echo exchange.
///
/// Each [`Pinger`] keeps one native channel per `IpVersion`.
///
/// [`Pinger`]: crate::Pinger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    pub fn is_v4(self) -> bool {
        matches!(self, Self::V4)
    }

    pub(crate) fn domain(self) -> Domain {
        match self {
            Self::V4 => Domain::IPV4,
            Self::V6 => Domain::IPV6,
        }
    }

    pub(crate) fn protocol(self) -> Protocol {
        match self {
            Self::V4 => Protocol::ICMPV4,
            Self::V6 => Protocol::ICMPV6,
        }
    }

    /// Source address handed to the channel alongside the destination.
    ///
    /// V6 submissions carry an unspecified placeholder, V4 ones carry none.
    pub(crate) fn placeholder_source(self) -> Option<SocketAddr> {
        match self {
            Self::V4 => None,
            Self::V6 => Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)),
        }
    }
}

impl From<IpAddr> for IpVersion {
    fn from(addr: IpAddr) -> Self {
        Self::of(addr)
    }
}

pub(crate) fn to_socket_addr(addr: IpAddr) -> SocketAddr {
    SocketAddr::new(addr, 0)
}
