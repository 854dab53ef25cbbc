//! Custom error types for the panel.
//!
//! `PanelError` is the error type surfaced to whoever drives a session (the
//! CLI here, a GUI elsewhere). It is built with `thiserror` and converts from
//! the lower-level errors with `#[from]`, so `?` works across layers.
//!
//! ## Error Hierarchy
//!
//! - **`Communication`**: the device answered with text the status parser
//!   could not turn into a record. Recoverable; the next poll retries.
//! - **`InvalidUserInput`**: a value typed by the user was rejected before any
//!   command was built.
//! - **`DeviceCallAborted`**: the device library signalled a hard exit. The
//!   command channel absorbs the signal itself; this variant only reports the
//!   failed command back to the caller that issued it.
//! - **`ToggleUnavailable`** / **`UnsupportedMode`**: the state machine refused
//!   a request in the current mode.
//! - **`SessionClosed`**: the polling task is gone.
//! - **`Config`** / **`Io`**: startup problems.
//!
//! Nothing in the session core treats any of these as fatal.

use crate::config::ConfigError;
use crate::protocol::{Function, Mode, ParseError};
use thiserror::Error;

/// Convenience alias for results using the panel error type.
pub type PanelResult<T> = std::result::Result<T, PanelError>;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Communication error: {0}")]
    Communication(#[from] ParseError),

    #[error("Invalid input: {0}")]
    InvalidUserInput(String),

    #[error("Device call aborted: {0}")]
    DeviceCallAborted(String),

    #[error("Run/stop toggle is not available in {0} mode")]
    ToggleUnavailable(Mode),

    #[error("Mode {0} cannot be selected from the panel")]
    UnsupportedMode(Function),

    #[error("Device session is no longer running")]
    SessionClosed,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PanelError {
    /// True for errors the polling loop retries on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PanelError::Communication(_) | PanelError::DeviceCallAborted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PanelError::InvalidUserInput("voltage must be >= 0".to_string());
        assert_eq!(err.to_string(), "Invalid input: voltage must be >= 0");
    }

    #[test]
    fn test_parse_error_converts() {
        let err: PanelError = ParseError::MissingMode.into();
        assert!(err.is_recoverable());
        assert!(err.to_string().starts_with("Communication error"));
    }

    #[test]
    fn test_toggle_unavailable_names_mode() {
        let err = PanelError::ToggleUnavailable(Mode::Cc);
        assert!(err.to_string().contains("CC"));
        assert!(!err.is_recoverable());
    }
}
