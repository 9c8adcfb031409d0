//! An in-memory [`EchoBackend`] for exercising the engine without sockets.

use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    IpVersion, PENDING, PingOptions,
    backend::{EchoBackend, EchoChannel, EchoRequest, ReplyBuffer, WaitEvent},
    raw::{RawReply, V4_DATA_SIZE},
};

/// How a [`MockChannel`] answers a submission.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Behavior {
    /// Echo the payload back right away.
    Echo,
    /// Return this raw code right away.
    Code(u32),
    /// Park asynchronous submissions until the test completes them. Synchronous
    /// ones are echoed.
    Defer,
    /// Panic inside `submit`.
    Panic,
}

#[derive(Clone)]
pub(crate) struct MockBackend {
    state: Arc<State>,
}

struct State {
    behavior: Mutex<Behavior>,
    fail_open: AtomicBool,
    opened: AtomicUsize,
    last_source: Mutex<Option<SocketAddr>>,
    last_options: Mutex<Option<PingOptions>>,
    parked: Mutex<Option<Parked>>,
}

struct Parked {
    address: IpAddr,
    payload: Vec<u8>,
    reply: ReplyBuffer,
    event: WaitEvent,
}

pub(crate) struct MockChannel {
    state: Arc<State>,
}

impl MockBackend {
    pub(crate) const ROUND_TRIP_TIME: Duration = Duration::from_micros(250);
    pub(crate) const TTL: u8 = 64;

    pub(crate) fn new(behavior: Behavior) -> Self {
        Self {
            state: Arc::new(State {
                behavior: Mutex::new(behavior),
                fail_open: AtomicBool::new(false),
                opened: AtomicUsize::new(0),
                last_source: Mutex::new(None),
                last_options: Mutex::new(None),
                parked: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn set_behavior(&self, behavior: Behavior) {
        *self.state.behavior.lock() = behavior;
    }

    pub(crate) fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Number of channels opened so far.
    pub(crate) fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn last_source(&self) -> Option<SocketAddr> {
        *self.state.last_source.lock()
    }

    pub(crate) fn last_options(&self) -> Option<PingOptions> {
        *self.state.last_options.lock()
    }

    /// Answer the parked submission with an echo of its payload.
    ///
    /// Returns `false` if nothing was parked.
    pub(crate) fn complete_echo(&self) -> bool {
        self.complete(|parked| write_echo(&parked.reply, parked.address, &parked.payload))
    }

    /// Answer the parked submission with a bare status code.
    pub(crate) fn complete_with(&self, code: u32) -> bool {
        self.complete(|parked| write_status(&parked.reply, parked.address, code))
    }

    /// Answer the parked submission with an IPv4 reply whose data size runs
    /// past the end of the reply buffer.
    pub(crate) fn complete_overlong(&self) -> bool {
        self.complete(|parked| {
            write_echo(&parked.reply, parked.address, &parked.payload);
            parked.reply.write(|buf| {
                buf[V4_DATA_SIZE..V4_DATA_SIZE + 2].copy_from_slice(&u16::MAX.to_ne_bytes())
            });
        })
    }

    fn complete(&self, write: impl FnOnce(&Parked)) -> bool {
        let parked = match self.state.parked.lock().take() {
            Some(parked) => parked,
            None => return false,
        };

        write(&parked);
        parked.event.set();
        true
    }
}

impl EchoBackend for MockBackend {
    type Channel = MockChannel;

    fn open(&self, _version: IpVersion) -> io::Result<MockChannel> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(libc::EACCES));
        }

        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockChannel {
            state: Arc::clone(&self.state),
        })
    }
}

impl EchoChannel for MockChannel {
    fn submit(&self, request: EchoRequest<'_>) -> u32 {
        *self.state.last_source.lock() = request.source;
        *self.state.last_options.lock() = request.options.copied();

        let address = request.destination.ip();
        let behavior = *self.state.behavior.lock();
        match (behavior, request.event) {
            (Behavior::Panic, _) => panic!("echo channel failed mid-submit"),
            (Behavior::Code(code), _) => {
                write_status(request.reply, address, code);
                code
            }
            (Behavior::Defer, Some(event)) => {
                *self.state.parked.lock() = Some(Parked {
                    address,
                    payload: request.data.as_bytes().to_vec(),
                    reply: request.reply.clone(),
                    event: event.clone(),
                });
                PENDING
            }
            (Behavior::Echo | Behavior::Defer, _) => {
                write_echo(request.reply, address, request.data.as_bytes());
                0
            }
        }
    }
}

fn write_echo(reply: &ReplyBuffer, address: IpAddr, payload: &[u8]) {
    let raw = RawReply {
        address,
        status: 0,
        round_trip_time: MockBackend::ROUND_TRIP_TIME,
        ttl: MockBackend::TTL,
        flags: 0,
        payload,
    };
    reply.write(|buf| raw.write_to(buf));
}

fn write_status(reply: &ReplyBuffer, address: IpAddr, code: u32) {
    let raw = RawReply::status_only(address, code);
    reply.write(|buf| raw.write_to(buf));
}
