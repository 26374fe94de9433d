use tokio::sync::watch::{Receiver, Sender};

/// Broadcasts a one-way shutdown signal to every listener created from it.
///
/// The signal is sticky: once [ShutdownHandle::shutdown] has been called, every listener, including
/// ones created afterwards, observes it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::watch::channel(false).0,
        }
    }

    pub fn shutdown(&self) {
        // `send_replace` never fails, even when nobody is listening yet.
        let previous = self.sender.send_replace(true);
        if !previous {
            log::debug!("Shutdown signal sent");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been received. If this returns true then work
    /// should be stopped so that the run can shut down.
    pub fn should_shutdown(&mut self) -> bool {
        *self.receiver.borrow_and_update()
    }

    /// Wait for the shutdown signal to be received. It is safe to race this with another future so
    /// that the shutdown signal can be used to cancel other work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        // The sender lives in the handle, if every handle is gone then nobody can shut us down and
        // treating that as a shutdown is the only way to avoid waiting forever.
        let _ = self.receiver.wait_for(|shutdown| *shutdown).await;
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}
