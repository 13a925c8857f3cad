//! Isolation for calls into plugin code
//!
//! Hooks and handlers run under `catch_unwind` and an optional timeout, so a
//! plugin that errors, panics or hangs is reported instead of taking the
//! host down. Only unwinding panics are caught.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::application::errors::PluginError;

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Await a plugin future, converting panics and timeouts into `PluginError`
pub async fn guarded<F, T>(plugin: &str, label: &str, timeout: Option<Duration>, fut: F) -> Result<T, PluginError>
where
    F: Future<Output = Result<T, PluginError>>,
{
    let caught = AssertUnwindSafe(fut).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, caught).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(plugin = %plugin, "{} timed out after {:?}", label, limit);
                return Err(PluginError::TimedOut(limit));
            }
        },
        None => caught.await,
    };
    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            tracing::error!(plugin = %plugin, message = %msg, "{} panicked", label);
            Err(PluginError::Panicked(msg))
        }
    }
}
