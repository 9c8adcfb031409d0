use std::{net::IpAddr, time::Duration};

use crate::IpStatus;

/// IP options applied to an echo request, and reported back on a successful
/// reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PingOptions {
    /// Time-to-live (hop limit for IPv6).
    pub ttl: u8,
    /// Set the IPv4 "don't fragment" bit. Ignored by IPv6 replies.
    pub dont_fragment: bool,
}

impl PingOptions {
    pub fn new(ttl: u8, dont_fragment: bool) -> Self {
        Self { ttl, dont_fragment }
    }
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            ttl: crate::config::DEFAULT_TTL,
            dont_fragment: false,
        }
    }
}

/// The outcome of one echo exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReply {
    status: IpStatus,
    address: IpAddr,
    round_trip_time: Duration,
    options: Option<PingOptions>,
    payload: Vec<u8>,
}

impl PingReply {
    pub(crate) fn success(
        address: IpAddr,
        round_trip_time: Duration,
        options: PingOptions,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            status: IpStatus::Success,
            address,
            round_trip_time,
            options: Some(options),
            payload,
        }
    }

    /// A reply for an exchange that ended with a protocol status other than
    /// success: no round-trip time, no options, no payload.
    pub(crate) fn degraded(address: IpAddr, status: IpStatus) -> Self {
        Self {
            status,
            address,
            round_trip_time: Duration::ZERO,
            options: None,
            payload: Vec::new(),
        }
    }

    pub fn status(&self) -> IpStatus {
        self.status
    }

    /// Address the reply came from, or the destination when there was no
    /// reply.
    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn round_trip_time(&self) -> Duration {
        self.round_trip_time
    }

    /// Options reported with the reply. Only present on success.
    ///
    /// `ttl` is the TTL (hop limit for IPv6) the reply arrived with.
    /// `dont_fragment` is whatever the channel wrote into the reply flags:
    /// [`SocketBackend`] can't see the IP header of a reply, so it reports the
    /// value that was requested. It is always `false` for IPv6.
    ///
    /// [`SocketBackend`]: crate::SocketBackend
    pub fn options(&self) -> Option<&PingOptions> {
        self.options.as_ref()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
