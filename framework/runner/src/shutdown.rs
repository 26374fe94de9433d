use stampede_core::prelude::ShutdownHandle;
use tokio::signal;

pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<ShutdownHandle> {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                log::warn!("Received shutdown signal, shutting down...");
                listener_handle.shutdown();
            }
            Err(e) => {
                // The run can still end on its own, or be capped by the max duration.
                log::error!("Failed to listen for Ctrl-C: {e:?}");
            }
        }
    });

    Ok(handle)
}
