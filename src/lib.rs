//! ICMP echo dispatch over Linux ICMP datagram sockets, with blocking and
//! tokio-driven asynchronous completion.
//!
//! A [`Pinger`] sends one echo request at a time. [`Pinger::send`] blocks
//! until the exchange is over; [`Pinger::send_async`] returns a
//! [`PendingPing`] that resolves once the reply, a timeout or an error comes
//! back.
//!
//! Unanswered echoes are not errors: they come back as a [`PingReply`] whose
//! [`IpStatus`] says what happened. [`PingError`] is reserved for requests
//! that could not be carried out at all.
//!
//! The default [`SocketBackend`] doesn't need `CAP_NET_RAW`, but the group of
//! the calling process must be allowed by the `net.ipv4.ping_group_range`
//! sysctl. Other echo facilities can be plugged in through the traits in
//! [`backend`].
//!
//! ## MSRV version policy
//!
//! We might bump MSRV version at any time. If you require a lower MSRV
//! please open an issue.

#![deny(
    rust_2018_idioms,
    clippy::doc_markdown,
    rustdoc::broken_intra_doc_links
)]

pub use self::{
    config::{
        Config, ConfigBuilder, DEFAULT_PAYLOAD_LEN, DEFAULT_TIMEOUT, DEFAULT_TTL,
        MAX_PAYLOAD_SIZE,
    },
    error::PingError,
    ip_version::IpVersion,
    pinger::{PendingPing, Pinger},
    reply::{PingOptions, PingReply},
    socket::{SocketBackend, SocketChannel},
    status::{IP_STATUS_BASE, IpStatus, PENDING},
};

pub mod backend;
mod buffer;
mod channel;
mod config;
mod decode;
mod error;
mod ip_version;
pub mod packet;
mod pinger;
pub mod raw;
mod reply;
mod socket;
mod status;
#[cfg(test)]
mod testing;
mod wait;
