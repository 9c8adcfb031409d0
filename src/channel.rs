use tracing::debug;

use crate::{
    IpVersion, PingError,
    backend::{EchoBackend, EchoChannel},
};

/// The per-family channels of one [`Pinger`], opened on first use.
///
/// [`Pinger`]: crate::Pinger
pub(crate) struct Channels<C> {
    v4: Option<C>,
    v6: Option<C>,
}

impl<C: EchoChannel> Channels<C> {
    pub(crate) fn new() -> Self {
        Self { v4: None, v6: None }
    }

    /// Return the channel for `version`, opening it if this is the first time.
    ///
    /// A failed open leaves the slot empty, so the next call tries again.
    pub(crate) fn ensure<B>(&mut self, backend: &B, version: IpVersion) -> Result<&C, PingError>
    where
        B: EchoBackend<Channel = C>,
    {
        let slot = match version {
            IpVersion::V4 => &mut self.v4,
            IpVersion::V6 => &mut self.v6,
        };

        let channel = match slot.take() {
            Some(channel) => channel,
            None => {
                let channel = backend.open(version).map_err(|err| {
                    debug!(?version, %err, "failed to open echo channel");
                    PingError::Channel(err)
                })?;
                debug!(?version, "opened echo channel");
                channel
            }
        };

        Ok(slot.insert(channel))
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self, version: IpVersion) -> bool {
        match version {
            IpVersion::V4 => self.v4.is_some(),
            IpVersion::V6 => self.v6.is_some(),
        }
    }

    pub(crate) fn close(&mut self) {
        if self.v4.take().is_some() {
            debug!(version = ?IpVersion::V4, "closed echo channel");
        }
        if self.v6.take().is_some() {
            debug!(version = ?IpVersion::V6, "closed echo channel");
        }
    }
}
