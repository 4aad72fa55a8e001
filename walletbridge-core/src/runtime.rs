use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::BridgeError;

/// Runtime that drives command execution.
///
/// Borrows the ambient tokio runtime when constructed inside one, otherwise
/// owns a small multi-threaded runtime that is shut down on drop.
#[derive(Debug)]
pub(crate) struct BridgeRuntime {
    handle: Handle,
    owned: Option<Runtime>,
}

impl BridgeRuntime {
    pub(crate) fn new() -> Result<Self, BridgeError> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(Self {
                handle,
                owned: None,
            });
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("walletbridge")
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Internal(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(runtime),
        })
    }

    pub(crate) const fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for BridgeRuntime {
    fn drop(&mut self) {
        // dropping a runtime from inside another one panics
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}

/// Runs a synchronous host call on the blocking pool, giving up after
/// `timeout`. `None` means the host did not answer in time.
pub(crate) async fn bounded_blocking<T, F>(
    timeout: Duration,
    what: &str,
    call: F,
) -> Result<Option<T>, BridgeError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
        Ok(Ok(value)) => Ok(Some(value)),
        Ok(Err(e)) => Err(BridgeError::Internal(format!("{what} failed: {e}"))),
        Err(_) => {
            log::warn!("{what} did not answer within {timeout:?}");
            Ok(None)
        }
    }
}

/// Runs a synchronous host call on the blocking pool and waits for it.
pub(crate) async fn blocking<T, F>(what: &str, call: F) -> Result<T, BridgeError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| BridgeError::Internal(format!("{what} failed: {e}")))
}
