use std::sync::Arc;

use serde_json::Value;

use crate::error::{BridgeError, ErrorKind};

/// Receives the single result of a command.
///
/// Cordova hosts map this onto `sendPluginResult` for the stored callback id.
#[uniffi::export(with_foreign)]
pub trait CommandCallback: Send + Sync {
    /// The command succeeded with a JSON payload.
    fn on_success(&self, callback_id: String, payload_json: String);

    /// The command failed.
    fn on_failure(&self, callback_id: String, kind: ErrorKind, message: String);
}

/// Resolves a callback exactly once.
///
/// [`Resolver::resolve`] consumes the guard. A guard dropped without being
/// resolved (panicking task, runtime shutdown) reports `Internal`.
pub(crate) struct Resolver {
    callback_id: String,
    callback: Option<Arc<dyn CommandCallback>>,
}

impl Resolver {
    pub(crate) fn new(callback_id: String, callback: Arc<dyn CommandCallback>) -> Self {
        Self {
            callback_id,
            callback: Some(callback),
        }
    }

    pub(crate) fn resolve(mut self, result: Result<Value, BridgeError>) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let callback_id = std::mem::take(&mut self.callback_id);
        match result {
            Ok(payload) => callback.on_success(callback_id, payload.to_string()),
            Err(e) => {
                log::debug!("command {callback_id} failed: {e}");
                callback.on_failure(callback_id, e.kind(), e.to_string());
            }
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            log::error!("command {} dropped without a result", self.callback_id);
            callback.on_failure(
                std::mem::take(&mut self.callback_id),
                ErrorKind::Internal,
                "command ended without a result".to_string(),
            );
        }
    }
}
