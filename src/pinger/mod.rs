use std::{fmt, net::IpAddr, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::oneshot};
use tracing::{debug, trace};

pub use self::completion::PendingPing;
use self::completion::{Claim, Completion, Inflight, Outcome};
use crate::{
    Config, IpVersion, PENDING, PingError, PingOptions, PingReply, SocketBackend,
    backend::{EchoBackend, EchoChannel, EchoRequest},
    buffer::{Buffers, ReplyBuffer},
    channel::Channels,
    config::MAX_PAYLOAD_SIZE,
    decode::decode,
    ip_version,
    status::RawStatus,
    wait::{WaitEvent, WaitRegistration},
};

mod completion;

/// Sends ICMP echo requests through an [`EchoBackend`], one at a time.
///
/// Channels are opened lazily, one per address family, and kept until the
/// pinger is disposed. The reply buffer is allocated once and reused.
///
/// A pinger handles a single exchange at a time: starting another one while
/// an asynchronous echo is still in flight fails with [`PingError::Busy`].
pub struct Pinger<B: EchoBackend = SocketBackend> {
    backend: B,
    config: Config,
    version: Option<IpVersion>,
    sent_len: usize,
    channels: Channels<B::Channel>,
    buffers: Buffers,
    inflight: Arc<Mutex<Inflight>>,
    disposed: bool,
}

enum Mode {
    Sync,
    Async {
        runtime: Handle,
        sender: oneshot::Sender<Outcome>,
    },
}

enum Dispatch {
    /// The exchange is over and this is its outcome.
    Complete(Outcome),
    /// The outcome reaches the caller through the [`PendingPing`].
    Pending,
}

impl Pinger<SocketBackend> {
    /// Construct a pinger over ICMP datagram sockets with the default
    /// [`Config`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_backend(SocketBackend, config)
    }
}

impl Default for Pinger<SocketBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: EchoBackend> Pinger<B> {
    /// Construct a pinger on top of a custom echo facility.
    ///
    /// Nothing is opened or allocated until the first request.
    pub fn with_backend(backend: B, config: Config) -> Self {
        Self {
            backend,
            config,
            version: None,
            sent_len: 0,
            channels: Channels::new(),
            buffers: Buffers::default(),
            inflight: Arc::new(Mutex::new(Inflight::default())),
            disposed: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send one echo request to `address` and block until its outcome is
    /// known, at most `timeout`.
    ///
    /// An unanswered or rejected echo is not an error: it's a [`PingReply`]
    /// whose [`status`] says what happened. Errors are reserved for requests
    /// that could not be carried out at all.
    ///
    /// [`status`]: PingReply::status
    pub fn send(
        &mut self,
        address: IpAddr,
        payload: &[u8],
        timeout: Duration,
        options: Option<&PingOptions>,
    ) -> Result<PingReply, PingError> {
        match self.dispatch(address, payload, timeout, options, Mode::Sync)? {
            Dispatch::Complete(outcome) => outcome,
            Dispatch::Pending => unreachable!("synchronous exchanges complete in place"),
        }
    }

    /// Send one echo request to `address` without blocking.
    ///
    /// Must be called from within a tokio runtime; the completion of the
    /// exchange runs on it. Errors detected before the request is handed over
    /// are returned directly, everything else resolves the [`PendingPing`].
    pub fn send_async(
        &mut self,
        address: IpAddr,
        payload: &[u8],
        timeout: Duration,
        options: Option<&PingOptions>,
    ) -> Result<PendingPing, PingError> {
        let runtime = Handle::try_current()?;
        let (sender, receiver) = oneshot::channel();

        // an exchange that finished in place has already resolved the
        // receiver
        self.dispatch(
            address,
            payload,
            timeout,
            options,
            Mode::Async { runtime, sender },
        )?;

        let generation = self.inflight.lock().generation();
        Ok(PendingPing::new(
            receiver,
            Arc::clone(&self.inflight),
            generation,
        ))
    }

    /// [`send`] with the payload, timeout and options of the [`Config`].
    ///
    /// [`send`]: Pinger::send
    pub fn ping(&mut self, address: IpAddr) -> Result<PingReply, PingError> {
        let (payload, timeout, options) = self.defaults();
        self.send(address, &payload, timeout, options.as_ref())
    }

    /// [`send_async`] with the payload, timeout and options of the [`Config`].
    ///
    /// [`send_async`]: Pinger::send_async
    pub fn ping_async(&mut self, address: IpAddr) -> Result<PendingPing, PingError> {
        let (payload, timeout, options) = self.defaults();
        self.send_async(address, &payload, timeout, options.as_ref())
    }

    /// Whether an exchange is in flight.
    pub fn is_busy(&self) -> bool {
        self.inflight.lock().is_busy()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release every resource held by the pinger.
    ///
    /// An asynchronous echo still in flight resolves as
    /// [`PingError::Cancelled`]. Later requests fail with
    /// [`PingError::Disposed`]. Calling this more than once does nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if self.inflight.lock().finish().is_some() {
            debug!("disposed with an echo in flight");
        }
        self.buffers.release();
        self.channels.close();
        self.version = None;
        self.sent_len = 0;
    }

    fn defaults(&self) -> (Vec<u8>, Duration, Option<PingOptions>) {
        (
            self.config.payload().to_vec(),
            self.config.timeout(),
            self.config.options().copied(),
        )
    }

    fn dispatch(
        &mut self,
        address: IpAddr,
        payload: &[u8],
        timeout: Duration,
        options: Option<&PingOptions>,
        mode: Mode,
    ) -> Result<Dispatch, PingError> {
        if self.disposed {
            return Err(PingError::Disposed);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PingError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if options.map_or(false, |options| options.ttl == 0) {
            return Err(PingError::BadParameter("ttl must be at least 1"));
        }
        let generation = self.inflight.lock().begin()?;

        let version = IpVersion::of(address);
        self.version = Some(version);
        self.sent_len = payload.len();
        let is_async = matches!(mode, Mode::Async { .. });
        trace!(%address, len = payload.len(), ?timeout, is_async, "sending echo request");

        let claim = Claim::new(Arc::clone(&self.inflight), generation);
        let submitted = self.submit(address, payload, timeout, options, mode, generation);
        claim.disarm();

        let (code, reply) = match submitted {
            Ok(submitted) => submitted,
            Err(err) => {
                // drops the pending sender and the wait along with it
                self.inflight.lock().finish();
                return Err(err);
            }
        };

        if is_async && code == PENDING {
            trace!(%address, "echo request pending");
            return Ok(Dispatch::Pending);
        }

        let outcome = match RawStatus::classify(code) {
            RawStatus::Success => reply.read(|raw| decode(raw, version, payload.len())),
            RawStatus::Os(code) => Err(PingError::Os { code }),
            RawStatus::Protocol(status) => Ok(PingReply::degraded(address, status)),
        };
        trace!(%address, code, "echo request completed in place");

        let sender = self.inflight.lock().finish();
        Ok(match sender {
            Some(sender) => {
                let _ = sender.send(outcome);
                Dispatch::Pending
            }
            None => Dispatch::Complete(outcome),
        })
    }

    /// Prepare the buffers, the wait and the channel, then hand the request
    /// to the channel.
    fn submit(
        &mut self,
        address: IpAddr,
        payload: &[u8],
        timeout: Duration,
        options: Option<&PingOptions>,
        mode: Mode,
        generation: u64,
    ) -> Result<(u32, ReplyBuffer), PingError> {
        let version = IpVersion::of(address);
        let reply = self.buffers.ensure_reply_buffer()?;

        let event = match mode {
            Mode::Sync => None,
            Mode::Async { runtime, sender } => {
                let event = WaitEvent::new();
                let completion = Completion::new(
                    Arc::clone(&self.inflight),
                    reply.clone(),
                    version,
                    payload.len(),
                    generation,
                );
                let registration =
                    WaitRegistration::register(&runtime, &event, move || completion.complete());

                let mut inflight = self.inflight.lock();
                inflight.event = Some(event.clone());
                inflight.registration = Some(registration);
                inflight.pending = Some(sender);
                drop(inflight);

                Some(event)
            }
        };

        let request = self.inflight.lock().request.stage(payload)?;
        let channel = self.channels.ensure(&self.backend, version)?;

        let code = channel.submit(EchoRequest {
            destination: ip_version::to_socket_addr(address),
            source: version.placeholder_source(),
            data: &request,
            reply: &reply,
            options,
            timeout,
            event: event.as_ref(),
        });

        Ok((code, reply))
    }
}

impl<B: EchoBackend> fmt::Debug for Pinger<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (waiting, busy) = {
            let inflight = self.inflight.lock();
            (inflight.is_waiting(), inflight.is_busy())
        };

        f.debug_struct("Pinger")
            .field("version", &self.version)
            .field("sent_len", &self.sent_len)
            .field("waiting", &waiting)
            .field("busy", &busy)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl<B: EchoBackend> Drop for Pinger<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}
