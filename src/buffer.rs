//! Request and reply buffers handed to an [`EchoChannel`].
//!
//! [`EchoChannel`]: crate::backend::EchoChannel

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{PingError, config::MAX_PAYLOAD_SIZE, raw::MAX_HEADER_LEN};

const ICMP_HEADER_LEN: usize = 8;
const ICMP_ERROR_SPACE: usize = 8;

/// Capacity of the reply buffer: the largest native header followed by the
/// largest echo payload, plus room for an ICMP header and error data.
pub const REPLY_BUFFER_SIZE: usize =
    MAX_HEADER_LEN + MAX_PAYLOAD_SIZE + ICMP_HEADER_LEN + ICMP_ERROR_SPACE;

/// Handle to the fixed-size buffer a channel writes replies into.
///
/// Clones share the same memory.
#[derive(Clone)]
pub struct ReplyBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl ReplyBuffer {
    fn allocate(size: usize) -> Result<Self, PingError> {
        let buf = allocate_zeroed(size)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(buf)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().len()
    }

    /// Run `f` with exclusive write access to the buffer.
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.inner.lock())
    }

    #[cfg(test)]
    pub(crate) fn same_as(&self, other: &ReplyBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Payload of one echo request, sized exactly to it.
#[derive(Debug, Clone)]
pub struct RequestBuffer {
    data: Arc<Vec<u8>>,
}

impl RequestBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Owner of the reusable reply buffer.
#[derive(Default)]
pub(crate) struct Buffers {
    reply: Option<ReplyBuffer>,
}

impl Buffers {
    /// Allocate the reply buffer on first use and hand out the same one after.
    pub(crate) fn ensure_reply_buffer(&mut self) -> Result<ReplyBuffer, PingError> {
        if let Some(reply) = &self.reply {
            return Ok(reply.clone());
        }

        let reply = ReplyBuffer::allocate(REPLY_BUFFER_SIZE)?;
        self.reply = Some(reply.clone());
        Ok(reply)
    }

    pub(crate) fn release(&mut self) {
        self.reply = None;
    }
}

/// Slot holding the request buffer of the exchange in flight.
#[derive(Default)]
pub(crate) struct RequestSlot {
    staged: Option<RequestBuffer>,
}

impl RequestSlot {
    /// Copy `payload` into a fresh buffer, releasing whatever was staged before.
    pub(crate) fn stage(&mut self, payload: &[u8]) -> Result<RequestBuffer, PingError> {
        self.release();

        let mut data = Vec::new();
        data.try_reserve_exact(payload.len())
            .map_err(|_| PingError::Allocation {
                size: payload.len(),
            })?;
        data.extend_from_slice(payload);

        let request = RequestBuffer {
            data: Arc::new(data),
        };
        self.staged = Some(request.clone());
        Ok(request)
    }

    /// Release the staged buffer. Returns whether there was one.
    pub(crate) fn release(&mut self) -> bool {
        self.staged.take().is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_staged(&self) -> bool {
        self.staged.is_some()
    }
}

fn allocate_zeroed(size: usize) -> Result<Vec<u8>, PingError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| PingError::Allocation { size })?;
    buf.resize(size, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::{Buffers, REPLY_BUFFER_SIZE, RequestSlot};

    #[test]
    fn reply_buffer_is_reused() {
        let mut buffers = Buffers::default();
        let a = buffers.ensure_reply_buffer().unwrap();
        let b = buffers.ensure_reply_buffer().unwrap();

        assert!(a.same_as(&b));
        assert_eq!(a.capacity(), REPLY_BUFFER_SIZE);
    }

    #[test]
    fn reply_buffer_recreated_after_release() {
        let mut buffers = Buffers::default();
        let a = buffers.ensure_reply_buffer().unwrap();
        buffers.release();
        buffers.release();
        let b = buffers.ensure_reply_buffer().unwrap();

        assert!(!a.same_as(&b));
    }

    #[test]
    fn request_is_sized_to_payload() {
        let mut slot = RequestSlot::default();
        let request = slot.stage(&[1, 2, 3, 4, 5]).unwrap();

        assert_eq!(request.len(), 5);
        assert_eq!(request.as_bytes(), &[1, 2, 3, 4, 5]);
        assert!(slot.is_staged());
    }

    #[test]
    fn request_release_is_idempotent() {
        let mut slot = RequestSlot::default();
        assert!(!slot.release());

        slot.stage(b"ping").unwrap();
        assert!(slot.release());
        assert!(!slot.release());
        assert!(!slot.is_staged());
    }
}
