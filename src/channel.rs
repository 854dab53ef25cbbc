//! Exclusive command channel to one device.
//!
//! Every command that reaches the device goes through [`CommandChannel::execute`].
//! The device has a single response stream, so the channel holds one async
//! mutex for the whole call (send and drain output); a poll and a user command
//! can only interleave between calls, never inside one.
//!
//! The device library is synchronous and may block, so each call runs on a
//! blocking worker that owns the lock guard. A hard exit reported by the
//! library, or a panic inside it, ends up here as a degraded
//! [`DeviceResponse`] with empty text; nothing escapes past this boundary and
//! the guard is dropped on every path, unwinding included.

use crate::adapters::DeviceLibrary;
use crate::error::{PanelError, PanelResult};
use crate::protocol::{Command, TargetId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Output captured from one device call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    text: String,
    aborted: Option<String>,
}

impl DeviceResponse {
    fn completed(text: String) -> Self {
        Self {
            text,
            aborted: None,
        }
    }

    fn aborted(reason: String) -> Self {
        Self {
            text: String::new(),
            aborted: Some(reason),
        }
    }

    /// Captured output; empty for an aborted call.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    /// For callers that need success or failure rather than raw text.
    pub fn into_result(self) -> PanelResult<String> {
        match self.aborted {
            Some(reason) => Err(PanelError::DeviceCallAborted(reason)),
            None => Ok(self.text),
        }
    }
}

struct ChannelInner {
    library: Box<dyn DeviceLibrary>,
    target: TargetId,
}

/// Cloneable handle to the serialized command path of one device.
#[derive(Clone)]
pub struct CommandChannel {
    inner: Arc<Mutex<ChannelInner>>,
    slow_call_warning: Option<Duration>,
}

impl CommandChannel {
    pub fn new(library: Box<dyn DeviceLibrary>, target: TargetId) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelInner { library, target })),
            slow_call_warning: None,
        }
    }

    /// Log calls (lock wait included) that take longer than `threshold`.
    pub fn with_slow_call_warning(mut self, threshold: Option<Duration>) -> Self {
        self.slow_call_warning = threshold;
        self
    }

    /// Device that subsequent commands are addressed to.
    pub async fn target(&self) -> TargetId {
        self.inner.lock().await.target.clone()
    }

    /// Re-address the channel. Takes effect at the next lock acquisition.
    pub async fn set_target(&self, target: TargetId) {
        let mut inner = self.inner.lock().await;
        debug!(from = %inner.target, to = %target, "Changing device target");
        inner.target = target;
    }

    /// Whether no call currently holds the channel.
    pub fn is_idle(&self) -> bool {
        self.inner.try_lock().is_ok()
    }

    /// Run one command with exclusive access to the device.
    pub async fn execute(&self, command: Command) -> DeviceResponse {
        let started = Instant::now();
        let label = command.to_string();
        let guard = self.inner.clone().lock_owned().await;

        let call = tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            let addressed = command.to(guard.target.clone());
            let mut output = Vec::new();
            let outcome = guard.library.execute(&addressed, &mut output);
            let library = guard.library.name().to_string();
            (library, addressed.target, outcome, output)
        })
        .await;

        let elapsed = started.elapsed();
        if let Some(threshold) = self.slow_call_warning {
            if elapsed > threshold {
                warn!(
                    command = %label,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Device call exceeded {:?}",
                    threshold
                );
            }
        }

        match call {
            Ok((library, target, Ok(()), output)) => {
                let text = String::from_utf8_lossy(&output).into_owned();
                debug!(
                    %library,
                    %target,
                    command = %label,
                    bytes = text.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Device call completed"
                );
                DeviceResponse::completed(text)
            }
            Ok((library, target, Err(abort), _partial)) => {
                warn!(%library, %target, command = %label, "Device call aborted: {}", abort);
                DeviceResponse::aborted(abort.to_string())
            }
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    "device library panicked".to_string()
                } else {
                    format!("device call cancelled: {}", join_error)
                };
                error!(command = %label, "{}", reason);
                DeviceResponse::aborted(reason)
            }
        }
    }
}
