use std::future::Future;
use std::time::Duration;

use stampede_core::prelude::{ShutdownHandle, ShutdownSignalError};

use crate::scheduler::VuLifecycle;

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
    drain_grace: Duration,
}

impl Executor {
    pub(crate) fn new(
        runtime: tokio::runtime::Runtime,
        shutdown_handle: ShutdownHandle,
        drain_grace: Duration,
    ) -> Self {
        Self {
            runtime,
            shutdown_handle,
            drain_grace,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// If the runner is shut down while the future is running, the future is given up to the drain
    /// grace period to complete so that an in-flight request can still be measured. After that it is
    /// cancelled and a [ShutdownSignalError] is returned. Submitting a future which does not support
    /// cancelling may prevent the runner from shutting down.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        let drain_grace = self.drain_grace;
        self.runtime.block_on(async move {
            tokio::pin!(fut);

            let finished = tokio::select! {
                result = &mut fut => Some(result),
                _ = shutdown_listener.wait_for_shutdown() => None,
            };

            match finished {
                Some(result) => result,
                None => match tokio::time::timeout(drain_grace, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!(ShutdownSignalError::default())),
                },
            }
        })
    }

    /// The pause between two iterations of a VU. Returns early if the VU is drained or the runner
    /// shuts down.
    pub(crate) fn pause(&self, duration: Duration, lifecycle: &VuLifecycle) {
        if duration.is_zero() {
            return;
        }

        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = shutdown_listener.wait_for_shutdown() => {}
                _ = lifecycle.wait_for_drain() => {}
            }
        });
    }

    /// Sleep for `duration`, returning early if the runner shuts down.
    pub(crate) fn sleep_unless_shutdown(&self, duration: Duration) {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = shutdown_listener.wait_for_shutdown() => {}
            }
        });
    }
}
