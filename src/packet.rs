//! ICMP echo packets exchanged by the [`SocketBackend`].
//!
//! Linux ICMP datagram sockets fill in the identifier and checksum on their
//! own, but still expect the caller to supply the echo header.
//!
//! [`SocketBackend`]: crate::SocketBackend

use pnet_packet::{
    Packet as _,
    icmp::{IcmpPacket, IcmpTypes},
    icmpv6::{Icmpv6Packet, Icmpv6Types},
    util,
};

use crate::IpVersion;

const ECHO_HEADER_LEN: usize = 8;

/// An ICMP echo request packet
pub struct EchoRequestPacket {
    buf: Vec<u8>,
}

/// An ICMP echo reply packet
pub struct EchoReplyPacket<'a> {
    version: IpVersion,
    buf: &'a [u8],
}

impl EchoRequestPacket {
    /// Build a new ICMP echo request packet
    pub fn new(version: IpVersion, identifier: u16, sequence_number: u16, payload: &[u8]) -> Self {
        let mut buf = vec![0; ECHO_HEADER_LEN + payload.len()];

        match version {
            IpVersion::V4 => {
                use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;

                let mut packet = MutableEchoRequestPacket::new(&mut buf)
                    .expect("buffer holds an echo header");
                packet.set_icmp_type(IcmpTypes::EchoRequest);
                packet.set_identifier(identifier);
                packet.set_sequence_number(sequence_number);
                packet.set_payload(payload);
                packet.set_checksum(util::checksum(packet.packet(), 1));
            }
            IpVersion::V6 => {
                use pnet_packet::icmpv6::echo_request::MutableEchoRequestPacket;

                let mut packet = MutableEchoRequestPacket::new(&mut buf)
                    .expect("buffer holds an echo header");
                packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
                packet.set_identifier(identifier);
                packet.set_sequence_number(sequence_number);
                packet.set_payload(payload);
                packet.set_checksum(util::checksum(packet.packet(), 1));
            }
        }

        Self { buf }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl<'a> EchoReplyPacket<'a> {
    /// Parse an ICMP echo reply packet, ignoring every other ICMP message
    pub fn parse(version: IpVersion, buf: &'a [u8]) -> Option<Self> {
        if buf.len() < ECHO_HEADER_LEN {
            return None;
        }

        let is_reply = match version {
            IpVersion::V4 => IcmpPacket::new(buf)?.get_icmp_type() == IcmpTypes::EchoReply,
            IpVersion::V6 => Icmpv6Packet::new(buf)?.get_icmpv6_type() == Icmpv6Types::EchoReply,
        };

        is_reply.then_some(Self { version, buf })
    }

    /// Get the ICMP packet identifier
    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes([self.buf[4], self.buf[5]])
    }

    /// Get the ICMP packet sequence number
    pub fn sequence_number(&self) -> u16 {
        match self.version {
            IpVersion::V4 => {
                use pnet_packet::icmp::echo_reply::EchoReplyPacket;

                EchoReplyPacket::new(self.buf).map_or(0, |packet| packet.get_sequence_number())
            }
            IpVersion::V6 => {
                use pnet_packet::icmpv6::echo_reply::EchoReplyPacket;

                EchoReplyPacket::new(self.buf).map_or(0, |packet| packet.get_sequence_number())
            }
        }
    }

    /// Get the ICMP packet payload
    pub fn payload(&self) -> &'a [u8] {
        &self.buf[ECHO_HEADER_LEN..]
    }
}
