use std::sync::Arc;

use tokio::{runtime::Handle, sync::Notify, task::JoinHandle};

/// Signal an [`EchoChannel`] raises once it has written the outcome of an
/// asynchronous exchange into the reply buffer.
///
/// A signal raised before anyone waits is kept, so it can't be lost between
/// submission and registration.
///
/// [`EchoChannel`]: crate::backend::EchoChannel
#[derive(Debug, Clone, Default)]
pub struct WaitEvent {
    notify: Arc<Notify>,
}

impl WaitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.notify.notify_one();
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// A callback registered against a [`WaitEvent`].
///
/// The callback fires at most once, with no time limit. Dropping the
/// registration without calling [`unregister`] leaves it armed.
///
/// [`unregister`]: WaitRegistration::unregister
#[derive(Debug)]
pub(crate) struct WaitRegistration {
    task: JoinHandle<()>,
}

impl WaitRegistration {
    pub(crate) fn register<F>(runtime: &Handle, event: &WaitEvent, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let event = event.clone();
        let task = runtime.spawn(async move {
            event.wait().await;
            callback();
        });

        Self { task }
    }

    /// Stop waiting. The callback won't run if it hasn't started yet.
    pub(crate) fn unregister(self) {
        self.task.abort();
    }
}
