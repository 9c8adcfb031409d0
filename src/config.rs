use std::time::Duration;

use crate::PingOptions;

/// Timeout used by [`Pinger::ping`] unless configured otherwise.
///
/// [`Pinger::ping`]: crate::Pinger::ping
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Length of the default echo payload.
pub const DEFAULT_PAYLOAD_LEN: usize = 32;

pub const DEFAULT_TTL: u8 = 128;

/// Largest payload a single echo request may carry.
pub const MAX_PAYLOAD_SIZE: usize = 65500;

/// Defaults for the convenience calls on a [`Pinger`].
///
/// [`Pinger`]: crate::Pinger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    timeout: Duration,
    payload: Vec<u8>,
    options: Option<PingOptions>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn options(&self) -> Option<&PingOptions> {
        self.options.as_ref()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    timeout: Duration,
    payload: Option<Vec<u8>>,
    payload_len: usize,
    options: Option<PingOptions>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            payload: None,
            payload_len: DEFAULT_PAYLOAD_LEN,
            options: None,
        }
    }
}

impl ConfigBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use exactly `payload` as the echo data.
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Use a generated payload of `len` bytes. Ignored if [`payload`] is set.
    ///
    /// [`payload`]: ConfigBuilder::payload
    pub fn payload_len(mut self, len: usize) -> Self {
        self.payload_len = len;
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.options.get_or_insert_with(PingOptions::default).ttl = ttl;
        self
    }

    pub fn dont_fragment(mut self, dont_fragment: bool) -> Self {
        self.options
            .get_or_insert_with(PingOptions::default)
            .dont_fragment = dont_fragment;
        self
    }

    pub fn build(self) -> Config {
        let payload = self
            .payload
            .unwrap_or_else(|| default_payload(self.payload_len));

        Config {
            timeout: self.timeout,
            payload,
            options: self.options,
        }
    }
}

/// The classic ping payload: the alphabet from `a` to `w`, repeated.
fn default_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 23) as u8).collect()
}
