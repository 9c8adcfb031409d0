use std::io;

use tokio::runtime::TryCurrentError;

/// Errors produced by a [`Pinger`].
///
/// Protocol outcomes such as a timeout or an unreachable destination are not
/// errors, they come back as a [`PingReply`] with the matching [`IpStatus`].
///
/// [`Pinger`]: crate::Pinger
/// [`PingReply`]: crate::PingReply
/// [`IpStatus`]: crate::IpStatus
#[derive(Debug, thiserror::Error)]
pub enum PingError {
    /// The operating system refused to open an echo channel.
    #[error("failed to open ICMP echo channel: {0}")]
    Channel(#[source] io::Error),

    #[error("failed to allocate a {size} byte echo buffer")]
    Allocation { size: usize },

    /// The echo failed below the ICMP layer.
    #[error("echo failed with OS error {code}: {}", os_message(.code))]
    Os { code: u32 },

    #[error("malformed echo reply: {0}")]
    Decode(&'static str),

    #[error("echo request was cancelled")]
    Cancelled,

    #[error("an echo request is already in flight on this pinger")]
    Busy,

    #[error("pinger has been disposed")]
    Disposed,

    #[error("payload of {len} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("invalid parameter: {0}")]
    BadParameter(&'static str),

    /// Asynchronous dispatch needs a tokio runtime to run the completion on.
    #[error("asynchronous echo requires a tokio runtime")]
    Runtime(#[from] TryCurrentError),
}

impl PingError {
    /// The raw operating system code, for [`PingError::Os`] and
    /// [`PingError::Channel`].
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::Os { code } => Some(*code),
            Self::Channel(err) => err.raw_os_error().map(|code| code as u32),
            _ => None,
        }
    }
}

fn os_message(code: &u32) -> String {
    io::Error::from_raw_os_error(*code as i32).to_string()
}
