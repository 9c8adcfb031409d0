use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use futures_core::FusedFuture;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::trace;

use crate::{
    IpVersion, PingError, PingReply,
    buffer::{ReplyBuffer, RequestSlot},
    decode::decode,
    wait::{WaitEvent, WaitRegistration},
};

pub(crate) type Outcome = Result<PingReply, PingError>;

/// State of the exchange in flight, shared between a [`Pinger`] and the
/// completion of its asynchronous echo.
///
/// [`Pinger`]: crate::Pinger
#[derive(Default)]
pub(crate) struct Inflight {
    generation: u64,
    busy: bool,
    cancelled: bool,
    pub(super) request: RequestSlot,
    pub(super) event: Option<WaitEvent>,
    pub(super) registration: Option<WaitRegistration>,
    pub(super) pending: Option<oneshot::Sender<Outcome>>,
}

impl Inflight {
    /// Claim the pinger for a new exchange.
    pub(super) fn begin(&mut self) -> Result<u64, PingError> {
        if self.busy {
            return Err(PingError::Busy);
        }

        self.busy = true;
        self.cancelled = false;
        self.generation = self.generation.wrapping_add(1);
        Ok(self.generation)
    }

    /// End the exchange without waiting for its completion: release the
    /// request buffer, unregister the wait and hand back the pending sender.
    pub(super) fn finish(&mut self) -> Option<oneshot::Sender<Outcome>> {
        self.request.release();
        if let Some(registration) = self.registration.take() {
            registration.unregister();
        }
        self.event = None;
        self.busy = false;
        self.cancelled = false;
        self.pending.take()
    }

    pub(super) fn generation(&self) -> u64 {
        self.generation
    }

    pub(super) fn is_busy(&self) -> bool {
        self.busy
    }

    /// Whether a wait is registered for an asynchronous echo.
    pub(super) fn is_waiting(&self) -> bool {
        self.event.is_some()
    }

    fn owns(&self, generation: u64) -> bool {
        self.busy && self.generation == generation
    }

    fn cancel(&mut self, generation: u64) {
        if self.owns(generation) {
            self.cancelled = true;
        }
    }
}

/// Settles the exchange when dropped, whether decoding finished or not.
struct Settle<'a>(MutexGuard<'a, Inflight>);

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        self.0.request.release();
        // the wait already fired, nothing left to unregister
        drop(self.0.registration.take());
        self.0.event = None;
        self.0.busy = false;
        self.0.cancelled = false;
    }
}

/// Releases the claim on the pinger if handing the request to the channel
/// unwinds.
pub(super) struct Claim {
    inflight: Arc<Mutex<Inflight>>,
    generation: u64,
    armed: bool,
}

impl Claim {
    pub(super) fn new(inflight: Arc<Mutex<Inflight>>, generation: u64) -> Self {
        Self {
            inflight,
            generation,
            armed: true,
        }
    }

    pub(super) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut inflight = self.inflight.lock();
        if inflight.owns(self.generation) {
            trace!("echo submission unwound");
            drop(inflight.finish());
        }
    }
}

/// Runs once the channel signals that an asynchronous echo is done.
pub(super) struct Completion {
    inflight: Arc<Mutex<Inflight>>,
    reply: ReplyBuffer,
    version: IpVersion,
    sent_len: usize,
    generation: u64,
}

impl Completion {
    pub(super) fn new(
        inflight: Arc<Mutex<Inflight>>,
        reply: ReplyBuffer,
        version: IpVersion,
        sent_len: usize,
        generation: u64,
    ) -> Self {
        Self {
            inflight,
            reply,
            version,
            sent_len,
            generation,
        }
    }

    pub(super) fn complete(self) {
        let (cancelled, decoded, sender) = {
            let inflight = self.inflight.lock();
            if !inflight.owns(self.generation) {
                // already settled by the dispatching side
                return;
            }

            let mut settle = Settle(inflight);
            let cancelled = settle.0.cancelled;
            let sender = settle.0.pending.take();
            let decoded = self
                .reply
                .read(|raw| decode(raw, self.version, self.sent_len));
            (cancelled, decoded, sender)
        };

        let Some(sender) = sender else {
            return;
        };

        let outcome = if cancelled {
            trace!("echo completed after cancellation");
            Err(PingError::Cancelled)
        } else {
            decoded
        };
        let _ = sender.send(outcome);
    }
}

/// An asynchronous echo in flight, obtained from [`Pinger::send_async`].
///
/// Resolves exactly once: with the reply, with the error that ended the
/// exchange, or with [`PingError::Cancelled`]. Dropping it cancels the echo.
///
/// [`Pinger::send_async`]: crate::Pinger::send_async
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct PendingPing {
    receiver: oneshot::Receiver<Outcome>,
    inflight: Arc<Mutex<Inflight>>,
    generation: u64,
    terminated: bool,
}

impl PendingPing {
    pub(super) fn new(
        receiver: oneshot::Receiver<Outcome>,
        inflight: Arc<Mutex<Inflight>>,
        generation: u64,
    ) -> Self {
        Self {
            receiver,
            inflight,
            generation,
            terminated: false,
        }
    }

    /// Ask for the echo to resolve as cancelled.
    ///
    /// The request already handed to the operating system is not aborted; its
    /// outcome is discarded when it arrives. Has no effect once the echo has
    /// completed.
    pub fn cancel(&self) {
        self.inflight.lock().cancel(self.generation);
    }
}

impl Future for PendingPing {
    type Output = Result<PingReply, PingError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = ready!(Pin::new(&mut self.receiver).poll(cx));
        self.terminated = true;

        // a dropped sender means the pinger was disposed mid-flight
        Poll::Ready(outcome.unwrap_or_else(|_| Err(PingError::Cancelled)))
    }
}

impl FusedFuture for PendingPing {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl Drop for PendingPing {
    fn drop(&mut self) {
        if !self.terminated {
            self.cancel();
        }
    }
}
