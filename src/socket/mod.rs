//! Echo backend over Linux ICMP datagram sockets.
//!
//! These sockets don't need `CAP_NET_RAW`, but the caller's group must be
//! allowed by the `net.ipv4.ping_group_range` sysctl.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU16, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    IpStatus, IpVersion, PENDING,
    backend::{EchoBackend, EchoChannel, EchoRequest, ReplyBuffer},
    packet::{EchoReplyPacket, EchoRequestPacket},
    raw::{IP_FLAG_DF, RawReply},
};

use self::base::BaseSocket;

mod base;

/// Largest ICMP message a datagram socket can hand back.
const RECV_BUFFER_SIZE: usize = 65536;

/// [`EchoBackend`] opening one ICMP datagram socket per address family.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketBackend;

impl EchoBackend for SocketBackend {
    type Channel = SocketChannel;

    fn open(&self, version: IpVersion) -> io::Result<SocketChannel> {
        SocketChannel::open(version)
    }
}

/// An ICMP datagram socket used as an echo channel.
///
/// The kernel rewrites the echo identifier to the socket's own, so replies are
/// told apart by sequence number only.
pub struct SocketChannel {
    socket: Arc<BaseSocket>,
    sequence_number: AtomicU16,
    recv_buf: Arc<Mutex<Vec<u8>>>,
}

impl SocketChannel {
    fn open(version: IpVersion) -> io::Result<Self> {
        let socket = BaseSocket::new_icmp(version)?;
        let recv_buf = allocate_recv_buffer(RECV_BUFFER_SIZE)?;

        let mut sequence_number = [0; 2];
        getrandom::fill(&mut sequence_number)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;

        Ok(Self {
            socket: Arc::new(socket),
            sequence_number: AtomicU16::new(u16::from_ne_bytes(sequence_number)),
            recv_buf: Arc::new(Mutex::new(recv_buf)),
        })
    }
}

impl EchoChannel for SocketChannel {
    fn submit(&self, request: EchoRequest<'_>) -> u32 {
        let version = self.socket.version();
        let sequence_number = self.sequence_number.fetch_add(1, Ordering::AcqRel);
        let options = request.options.copied().unwrap_or_default();

        if let Err(err) = self.socket.apply_options(&options) {
            return io_error_code(&err);
        }

        // the kernel picks the source address and fills in the identifier
        let packet = EchoRequestPacket::new(version, 0, sequence_number, request.data.as_bytes());
        let sent_at = Instant::now();
        if let Err(err) = self.socket.send_to(packet.as_bytes(), request.destination) {
            let code = io_error_code(&err);
            trace!(destination = %request.destination, code, "echo request not sent");
            return code;
        }

        // the reply's IP header isn't visible here, report what was requested
        let flags = if version.is_v4() && options.dont_fragment {
            IP_FLAG_DF
        } else {
            0
        };
        let exchange = Exchange {
            socket: Arc::clone(&self.socket),
            destination: request.destination,
            sequence_number,
            sent_at,
            deadline: deadline(sent_at, request.timeout),
            flags,
            reply: request.reply.clone(),
            recv_buf: Arc::clone(&self.recv_buf),
        };

        match request.event {
            None => exchange.run(),
            Some(event) => {
                let event = event.clone();
                tokio::task::spawn_blocking(move || {
                    exchange.run();
                    event.set();
                });
                PENDING
            }
        }
    }
}

/// The receiving half of one echo exchange.
struct Exchange {
    socket: Arc<BaseSocket>,
    destination: SocketAddr,
    sequence_number: u16,
    sent_at: Instant,
    /// `None` when the timeout runs past what `Instant` can represent.
    deadline: Option<Instant>,
    flags: u8,
    reply: ReplyBuffer,
    recv_buf: Arc<Mutex<Vec<u8>>>,
}

impl Exchange {
    /// Wait for the matching echo reply and write the outcome to the reply
    /// buffer.
    fn run(self) -> u32 {
        let version = self.socket.version();
        let mut buf = self.recv_buf.lock();

        loop {
            let remaining = match self.deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining == Duration::ZERO {
                return self.finish_with(IpStatus::TimedOut.code());
            }

            match self.socket.wait_readable(remaining) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => return self.finish_with(io_error_code(&err)),
            }

            let received = match self.socket.recv(&mut buf) {
                Ok(received) => received,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) => return self.finish_with(io_error_code(&err)),
            };

            let packet = match EchoReplyPacket::parse(version, &buf[..received.len]) {
                Some(packet) => packet,
                None => continue,
            };
            if packet.sequence_number() != self.sequence_number {
                trace!(
                    expected = self.sequence_number,
                    got = packet.sequence_number(),
                    "discarding stale echo reply"
                );
                continue;
            }

            let reply = RawReply {
                address: received.source.ip(),
                status: 0,
                round_trip_time: self.sent_at.elapsed(),
                ttl: received.hop_limit.unwrap_or(0),
                flags: self.flags,
                payload: packet.payload(),
            };
            self.reply.write(|out| reply.write_to(out));
            return 0;
        }
    }

    fn finish_with(&self, code: u32) -> u32 {
        trace!(destination = %self.destination, code, "echo exchange ended without a reply");

        let reply = RawReply::status_only(self.destination.ip(), code);
        self.reply.write(|out| reply.write_to(out));
        code
    }
}

fn deadline(sent_at: Instant, timeout: Duration) -> Option<Instant> {
    sent_at.checked_add(timeout)
}

/// Allocate the receive buffer of a channel, reporting failure instead of
/// aborting.
fn allocate_recv_buffer(size: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|err| {
        io::Error::new(
            io::ErrorKind::OutOfMemory,
            format!("failed to allocate a {size} byte receive buffer: {err}"),
        )
    })?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Map a socket error to a raw code: a protocol status when the error stands
/// for one, the errno otherwise.
fn io_error_code(err: &io::Error) -> u32 {
    let status = match err.raw_os_error() {
        Some(libc::ENETUNREACH) => IpStatus::DestinationNetworkUnreachable,
        Some(libc::EHOSTUNREACH) => IpStatus::DestinationHostUnreachable,
        Some(libc::ECONNREFUSED) => IpStatus::DestinationPortUnreachable,
        Some(libc::EMSGSIZE) => IpStatus::PacketTooBig,
        Some(libc::ETIMEDOUT) => IpStatus::TimedOut,
        // would be mistaken for a pending submission
        Some(libc::EINPROGRESS) => IpStatus::GeneralFailure,
        Some(code) if code > 0 => return code as u32,
        _ => IpStatus::GeneralFailure,
    };

    status.code()
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        net::{IpAddr, Ipv4Addr, Ipv6Addr},
        time::{Duration, Instant},
    };

    use super::{RECV_BUFFER_SIZE, allocate_recv_buffer, deadline, io_error_code};
    use crate::{IpStatus, PingError, PingOptions, Pinger};

    #[test]
    fn error_codes() {
        let code = |errno| io_error_code(&io::Error::from_raw_os_error(errno));

        assert_eq!(
            code(libc::EHOSTUNREACH),
            IpStatus::DestinationHostUnreachable.code()
        );
        assert_eq!(
            code(libc::ENETUNREACH),
            IpStatus::DestinationNetworkUnreachable.code()
        );
        assert_eq!(code(libc::EINPROGRESS), IpStatus::GeneralFailure.code());
        assert_eq!(code(libc::EACCES), libc::EACCES as u32);
        assert_eq!(
            io_error_code(&io::Error::new(io::ErrorKind::Other, "boom")),
            IpStatus::GeneralFailure.code()
        );
    }

    #[test]
    fn unbounded_timeout_has_no_deadline() {
        let now = Instant::now();

        assert_eq!(deadline(now, Duration::from_secs(2)), Some(now + Duration::from_secs(2)));
        assert_eq!(deadline(now, Duration::MAX), None);
    }

    #[test]
    fn recv_buffer_allocation() {
        let buf = allocate_recv_buffer(RECV_BUFFER_SIZE).unwrap();
        assert_eq!(buf.len(), RECV_BUFFER_SIZE);

        let err = allocate_recv_buffer(usize::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::OutOfMemory);
    }

    #[test]
    #[ignore = "needs net.ipv4.ping_group_range to allow ICMP sockets"]
    fn loopback_unbounded_timeout() {
        let mut pinger = Pinger::new();
        for _ in 0..2 {
            let reply = pinger
                .send(IpAddr::V4(Ipv4Addr::LOCALHOST), &[0; 32], Duration::MAX, None)
                .unwrap();
            assert_eq!(reply.status(), IpStatus::Success);
        }
        assert!(!pinger.is_busy());
    }

    #[test]
    #[ignore = "needs net.ipv4.ping_group_range to allow ICMP sockets"]
    fn loopback_reports_requested_dont_fragment() {
        let mut pinger = Pinger::new();
        let addr = IpAddr::V4(Ipv4Addr::LOCALHOST);

        for dont_fragment in [true, false] {
            let options = PingOptions::new(64, dont_fragment);
            let reply = pinger
                .send(addr, &[0; 32], Duration::from_secs(1), Some(&options))
                .unwrap();
            assert_eq!(reply.options().unwrap().dont_fragment, dont_fragment);
        }
    }

    #[test]
    #[ignore = "needs net.ipv4.ping_group_range to allow ICMP sockets"]
    fn loopback_v4() {
        let mut pinger = Pinger::new();
        let reply = pinger
            .send(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                &[0; 32],
                Duration::from_millis(1000),
                None,
            )
            .unwrap();

        assert_eq!(reply.status(), IpStatus::Success);
        assert_eq!(reply.address(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(reply.payload().len(), 32);
        assert!(reply.options().is_some());
    }

    #[test]
    #[ignore = "needs net.ipv4.ping_group_range to allow ICMP sockets"]
    fn loopback_v6_then_v4() {
        let mut pinger = Pinger::new();

        let v6 = pinger
            .send(
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                b"abcdefgh",
                Duration::from_secs(1),
                None,
            )
            .unwrap();
        assert_eq!(v6.status(), IpStatus::Success);
        assert_eq!(v6.payload(), b"abcdefgh");

        let v4 = pinger.ping(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        assert_eq!(v4.status(), IpStatus::Success);
    }

    #[tokio::test]
    #[ignore = "needs net.ipv4.ping_group_range to allow ICMP sockets"]
    async fn loopback_async() {
        let mut pinger = Pinger::new();
        let reply = pinger
            .send_async(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                &[0; 32],
                Duration::from_millis(1000),
                None,
            )
            .unwrap()
            .await
            .unwrap();

        assert_eq!(reply.status(), IpStatus::Success);
        assert_eq!(reply.payload().len(), 32);
    }

    #[test]
    #[ignore = "needs net.ipv4.ping_group_range to allow ICMP sockets"]
    fn unanswered_is_not_an_error() {
        let mut pinger = Pinger::new();
        let result = pinger.send(
            IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            &[0; 32],
            Duration::from_millis(100),
            None,
        );

        match result {
            Ok(reply) => {
                assert!(matches!(
                    reply.status(),
                    IpStatus::TimedOut
                        | IpStatus::DestinationHostUnreachable
                        | IpStatus::DestinationNetworkUnreachable
                ));
                assert!(reply.payload().is_empty());
                assert_eq!(reply.round_trip_time(), Duration::ZERO);
            }
            Err(err @ PingError::Channel(_)) => panic!("no ICMP socket: {err}"),
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
}
