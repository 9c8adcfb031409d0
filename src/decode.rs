use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    time::Duration,
};

use crate::{
    IpVersion, PingError, PingOptions, PingReply,
    raw::{
        IP_FLAG_DF, V4_ADDRESS, V4_DATA_SIZE, V4_FLAGS, V4_HEADER_LEN, V4_ROUND_TRIP_TIME,
        V4_STATUS, V4_TTL, V6_ADDRESS, V6_HOP_LIMIT, V6_PAYLOAD_OFFSET, V6_ROUND_TRIP_TIME,
        V6_STATUS, read_u16, read_u32,
    },
    status::RawStatus,
};

const SHORT_HEADER: PingError = PingError::Decode("reply buffer shorter than the reply header");
const SHORT_PAYLOAD: PingError = PingError::Decode("reply payload runs past the reply buffer");

/// Turn a native reply in `raw` into a [`PingReply`].
///
/// `sent_len` is the length of the request payload; IPv6 replies don't record
/// their own.
pub(crate) fn decode(
    raw: &[u8],
    version: IpVersion,
    sent_len: usize,
) -> Result<PingReply, PingError> {
    let status_offset = match version {
        IpVersion::V4 => V4_STATUS,
        IpVersion::V6 => V6_STATUS,
    };
    let status = read_u32(raw, status_offset).ok_or(SHORT_HEADER)?;
    let address = read_address(raw, version)?;

    match RawStatus::classify(status) {
        RawStatus::Os(code) => Err(PingError::Os { code }),
        RawStatus::Protocol(status) => Ok(PingReply::degraded(address, status)),
        RawStatus::Success => match version {
            IpVersion::V4 => decode_v4(raw, address),
            IpVersion::V6 => decode_v6(raw, address, sent_len),
        },
    }
}

fn decode_v4(raw: &[u8], address: IpAddr) -> Result<PingReply, PingError> {
    let rtt = read_u32(raw, V4_ROUND_TRIP_TIME).ok_or(SHORT_HEADER)?;
    let len = read_u16(raw, V4_DATA_SIZE).ok_or(SHORT_HEADER)?;
    let ttl = *raw.get(V4_TTL).ok_or(SHORT_HEADER)?;
    let flags = *raw.get(V4_FLAGS).ok_or(SHORT_HEADER)?;

    let payload = raw
        .get(V4_HEADER_LEN..V4_HEADER_LEN + usize::from(len))
        .ok_or(SHORT_PAYLOAD)?;
    let options = PingOptions {
        ttl,
        dont_fragment: flags & IP_FLAG_DF != 0,
    };

    Ok(PingReply::success(
        address,
        Duration::from_micros(rtt.into()),
        options,
        payload.to_vec(),
    ))
}

fn decode_v6(raw: &[u8], address: IpAddr, sent_len: usize) -> Result<PingReply, PingError> {
    let rtt = read_u32(raw, V6_ROUND_TRIP_TIME).ok_or(SHORT_HEADER)?;
    let hop_limit = *raw.get(V6_HOP_LIMIT).ok_or(SHORT_HEADER)?;

    let payload = raw
        .get(V6_PAYLOAD_OFFSET..V6_PAYLOAD_OFFSET + sent_len)
        .ok_or(SHORT_PAYLOAD)?;
    let options = PingOptions {
        ttl: hop_limit,
        dont_fragment: false,
    };

    Ok(PingReply::success(
        address,
        Duration::from_micros(rtt.into()),
        options,
        payload.to_vec(),
    ))
}

fn read_address(raw: &[u8], version: IpVersion) -> Result<IpAddr, PingError> {
    match version {
        IpVersion::V4 => {
            let octets: [u8; 4] = raw
                .get(V4_ADDRESS..V4_ADDRESS + 4)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or(SHORT_HEADER)?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        IpVersion::V6 => {
            let octets: [u8; 16] = raw
                .get(V6_ADDRESS..V6_ADDRESS + 16)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or(SHORT_HEADER)?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{IpAddr, Ipv4Addr, Ipv6Addr},
        time::Duration,
    };

    use super::decode;
    use crate::{
        IpStatus, IpVersion, PingError,
        raw::{IP_FLAG_DF, RawReply, V4_DATA_SIZE, V6_HEADER_LEN, V6_PAYLOAD_OFFSET},
    };

    fn write(reply: RawReply<'_>) -> Vec<u8> {
        let mut buf = vec![0u8; 256];
        reply.write_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn v4_success() {
        let payload = [0xabu8; 32];
        let raw = write(RawReply {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            status: 0,
            round_trip_time: Duration::from_micros(1500),
            ttl: 64,
            flags: IP_FLAG_DF,
            payload: &payload,
        });

        let reply = decode(&raw, IpVersion::V4, payload.len()).unwrap();
        assert_eq!(reply.status(), IpStatus::Success);
        assert_eq!(reply.address(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(reply.round_trip_time(), Duration::from_micros(1500));
        assert_eq!(reply.payload(), &payload);

        let options = reply.options().unwrap();
        assert_eq!(options.ttl, 64);
        assert!(options.dont_fragment);
    }

    #[test]
    fn v4_uses_its_own_length() {
        let payload = [1u8; 16];
        let mut raw = write(RawReply {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            status: 0,
            round_trip_time: Duration::ZERO,
            ttl: 64,
            flags: 0,
            payload: &payload,
        });
        raw[V4_DATA_SIZE..V4_DATA_SIZE + 2].copy_from_slice(&8u16.to_ne_bytes());

        let reply = decode(&raw, IpVersion::V4, 16).unwrap();
        assert_eq!(reply.payload().len(), 8);
        assert!(!reply.options().unwrap().dont_fragment);
    }

    #[test]
    fn v6_reads_sent_length_at_fixed_offset() {
        let mut raw = vec![0u8; V6_HEADER_LEN + 64];
        for (i, byte) in raw[V6_PAYLOAD_OFFSET..].iter_mut().enumerate() {
            *byte = i as u8;
        }
        raw[..16].copy_from_slice(&Ipv6Addr::LOCALHOST.octets());

        let reply = decode(&raw, IpVersion::V6, 24).unwrap();
        assert_eq!(reply.status(), IpStatus::Success);
        assert_eq!(reply.address(), IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(reply.payload(), (0..24).collect::<Vec<u8>>().as_slice());
        assert!(!reply.options().unwrap().dont_fragment);
    }

    #[test]
    fn v6_payload_past_buffer() {
        let raw = vec![0u8; V6_HEADER_LEN + 4];

        assert!(matches!(
            decode(&raw, IpVersion::V6, 8),
            Err(PingError::Decode(_))
        ));
    }

    #[test]
    fn protocol_status_is_degraded_reply() {
        let destination = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let raw = write(RawReply {
            address: destination,
            status: IpStatus::TimedOut.code(),
            round_trip_time: Duration::from_millis(3),
            ttl: 64,
            flags: 0,
            payload: &[9; 8],
        });

        let reply = decode(&raw, IpVersion::V4, 8).unwrap();
        assert_eq!(reply.status(), IpStatus::TimedOut);
        assert_eq!(reply.address(), destination);
        assert_eq!(reply.round_trip_time(), Duration::ZERO);
        assert!(reply.options().is_none());
        assert!(reply.payload().is_empty());
    }

    #[test]
    fn os_code_is_an_error() {
        let raw = write(RawReply::status_only(
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            libc::EACCES as u32,
        ));

        match decode(&raw, IpVersion::V6, 0) {
            Err(PingError::Os { code }) => assert_eq!(code, libc::EACCES as u32),
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn short_buffer() {
        assert!(matches!(
            decode(&[0; 3], IpVersion::V4, 0),
            Err(PingError::Decode(_))
        ));
    }
}
