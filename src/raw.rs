//! Native echo reply layouts.
//!
//! An [`EchoChannel`] writes the outcome of an exchange into the reply buffer
//! using one of these layouts, and the engine decodes it from there. All
//! integers are native-endian.
//!
//! IPv4 replies carry their own payload length. IPv6 replies don't: the
//! payload always starts at [`V6_PAYLOAD_OFFSET`] and is as long as the
//! request that was sent.
//!
//! [`EchoChannel`]: crate::backend::EchoChannel

use std::{net::IpAddr, time::Duration};

pub const V4_ADDRESS: usize = 0;
pub const V4_STATUS: usize = 4;
pub const V4_ROUND_TRIP_TIME: usize = 8;
pub const V4_DATA_SIZE: usize = 12;
pub const V4_TTL: usize = 16;
pub const V4_TOS: usize = 17;
pub const V4_FLAGS: usize = 18;
pub const V4_OPTIONS_SIZE: usize = 19;
pub const V4_HEADER_LEN: usize = 20;

pub const V6_ADDRESS: usize = 0;
pub const V6_SCOPE_ID: usize = 16;
pub const V6_STATUS: usize = 20;
pub const V6_ROUND_TRIP_TIME: usize = 24;
pub const V6_HOP_LIMIT: usize = 28;
pub const V6_HEADER_LEN: usize = 32;
pub const V6_PAYLOAD_OFFSET: usize = V6_HEADER_LEN;

pub const MAX_HEADER_LEN: usize = V6_HEADER_LEN;

/// "Don't fragment" bit of the IPv4 flags field.
pub const IP_FLAG_DF: u8 = 0x02;

/// Fields of a reply before they are laid out in the reply buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawReply<'a> {
    pub address: IpAddr,
    pub status: u32,
    pub round_trip_time: Duration,
    pub ttl: u8,
    pub flags: u8,
    pub payload: &'a [u8],
}

impl RawReply<'_> {
    /// A reply carrying only a status, addressed to `address`.
    pub fn status_only(address: IpAddr, status: u32) -> RawReply<'static> {
        RawReply {
            address,
            status,
            round_trip_time: Duration::ZERO,
            ttl: 0,
            flags: 0,
            payload: &[],
        }
    }

    /// Lay the reply out in `buf`, truncating the payload to what fits.
    ///
    /// Returns the number of bytes written, or `None` if `buf` can't even hold
    /// the header.
    pub fn write_to(&self, buf: &mut [u8]) -> Option<usize> {
        let rtt = u32::try_from(self.round_trip_time.as_micros()).unwrap_or(u32::MAX);

        match self.address {
            IpAddr::V4(addr) => {
                let header = buf.get_mut(..V4_HEADER_LEN)?;
                header.fill(0);
                header[V4_ADDRESS..V4_ADDRESS + 4].copy_from_slice(&addr.octets());
                header[V4_STATUS..V4_STATUS + 4].copy_from_slice(&self.status.to_ne_bytes());
                header[V4_ROUND_TRIP_TIME..V4_ROUND_TRIP_TIME + 4]
                    .copy_from_slice(&rtt.to_ne_bytes());
                header[V4_TTL] = self.ttl;
                header[V4_TOS] = 0;
                header[V4_FLAGS] = self.flags;
                header[V4_OPTIONS_SIZE] = 0;

                let len = self
                    .payload
                    .len()
                    .min(buf.len() - V4_HEADER_LEN)
                    .min(usize::from(u16::MAX));
                buf[V4_DATA_SIZE..V4_DATA_SIZE + 2].copy_from_slice(&(len as u16).to_ne_bytes());
                buf[V4_HEADER_LEN..V4_HEADER_LEN + len].copy_from_slice(&self.payload[..len]);

                Some(V4_HEADER_LEN + len)
            }
            IpAddr::V6(addr) => {
                let header = buf.get_mut(..V6_HEADER_LEN)?;
                header.fill(0);
                header[V6_ADDRESS..V6_ADDRESS + 16].copy_from_slice(&addr.octets());
                header[V6_STATUS..V6_STATUS + 4].copy_from_slice(&self.status.to_ne_bytes());
                header[V6_ROUND_TRIP_TIME..V6_ROUND_TRIP_TIME + 4]
                    .copy_from_slice(&rtt.to_ne_bytes());
                header[V6_HOP_LIMIT] = self.ttl;

                let len = self.payload.len().min(buf.len() - V6_PAYLOAD_OFFSET);
                buf[V6_PAYLOAD_OFFSET..V6_PAYLOAD_OFFSET + len]
                    .copy_from_slice(&self.payload[..len]);

                Some(V6_PAYLOAD_OFFSET + len)
            }
        }
    }
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_ne_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_ne_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, time::Duration};

    use super::{RawReply, V4_DATA_SIZE, V4_HEADER_LEN, read_u16};

    #[test]
    fn truncates_to_buffer() {
        let payload = [7u8; 64];
        let reply = RawReply {
            address: Ipv4Addr::LOCALHOST.into(),
            status: 0,
            round_trip_time: Duration::from_micros(10),
            ttl: 64,
            flags: 0,
            payload: &payload,
        };

        let mut buf = [0u8; V4_HEADER_LEN + 16];
        assert_eq!(reply.write_to(&mut buf), Some(V4_HEADER_LEN + 16));
        assert_eq!(read_u16(&buf, V4_DATA_SIZE), Some(16));
    }

    #[test]
    fn header_must_fit() {
        let reply = RawReply::status_only(Ipv4Addr::LOCALHOST.into(), 11010);
        let mut buf = [0u8; V4_HEADER_LEN - 1];

        assert_eq!(reply.write_to(&mut buf), None);
    }
}
