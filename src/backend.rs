//! The operating system echo facility as seen by a [`Pinger`].
//!
//! [`SocketBackend`] is the Linux implementation. Other facilities can be
//! plugged in with [`Pinger::with_backend`].
//!
//! [`Pinger`]: crate::Pinger
//! [`Pinger::with_backend`]: crate::Pinger::with_backend
//! [`SocketBackend`]: crate::SocketBackend

use std::{io, net::SocketAddr, time::Duration};

pub use crate::{
    buffer::{ReplyBuffer, RequestBuffer},
    wait::WaitEvent,
};
use crate::{IpVersion, PingOptions};

/// Opens echo channels.
pub trait EchoBackend: Send + Sync + 'static {
    type Channel: EchoChannel;

    /// Open a channel for `version`. Called at most once per version for the
    /// lifetime of a [`Pinger`].
    ///
    /// [`Pinger`]: crate::Pinger
    fn open(&self, version: IpVersion) -> io::Result<Self::Channel>;
}

/// A native session used to submit echo requests for one address family.
pub trait EchoChannel: Send + Sync + 'static {
    /// Submit one echo request and return a raw code.
    ///
    /// * `0`: the outcome has been written to `request.reply`.
    /// * [`PENDING`]: only when `request.event` is set. The outcome will be
    ///   written to `request.reply` later, after which the event is set.
    /// * a code at or above [`IP_STATUS_BASE`]: a protocol status.
    /// * anything else: an operating system error.
    ///
    /// Without an event the call blocks until a reply arrives or
    /// `request.timeout` elapses.
    ///
    /// [`PENDING`]: crate::PENDING
    /// [`IP_STATUS_BASE`]: crate::IP_STATUS_BASE
    fn submit(&self, request: EchoRequest<'_>) -> u32;
}

/// Everything a channel needs to perform one exchange.
pub struct EchoRequest<'a> {
    pub destination: SocketAddr,
    /// Source address placeholder. Always set for IPv6 requests.
    pub source: Option<SocketAddr>,
    pub data: &'a RequestBuffer,
    pub reply: &'a ReplyBuffer,
    pub options: Option<&'a PingOptions>,
    pub timeout: Duration,
    pub event: Option<&'a WaitEvent>,
}
