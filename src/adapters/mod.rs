//! Device library implementations
//!
//! The device library is the external piece that actually talks to an
//! OpenDPS unit over serial or Wi-Fi. The session core only relies on the
//! [`DeviceLibrary`] contract: run one addressed command, write whatever the
//! library prints into the given sink, and possibly bail out with a hard
//! exit ([`DeviceAbort`]) when the device cannot be reached.
//!
//! Implementations are synchronous and may block for as long as their
//! transport allows. [`crate::channel::CommandChannel`] is the only caller and
//! runs them on a blocking worker.

pub mod dpsctl;
pub mod mock;

pub use dpsctl::DpsctlProcess;
pub use mock::{Fault, MockJournal, MockPowerSupply};

use crate::config::{BackendKind, DeviceConfig};
use crate::protocol::AddressedCommand;
use std::io::Write;
use thiserror::Error;

/// Hard-exit signal raised by a device library, e.g. "device not found".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("device library exited{}: {message}", code_suffix(.code))]
pub struct DeviceAbort {
    pub code: Option<i32>,
    pub message: String,
}

impl DeviceAbort {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" with code {}", c)).unwrap_or_default()
}

/// Contract of the external command-control library.
pub trait DeviceLibrary: Send + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Execute one command. Everything the library prints goes to `out`;
    /// there is no return value besides the hard-exit signal.
    fn execute(
        &mut self,
        command: &AddressedCommand,
        out: &mut dyn Write,
    ) -> Result<(), DeviceAbort>;
}

/// Build the library selected by the device configuration.
pub fn from_config(device: &DeviceConfig) -> Box<dyn DeviceLibrary> {
    match device.backend {
        BackendKind::Dpsctl => Box::new(DpsctlProcess::new(&device.program, device.baudrate)),
        BackendKind::Mock => Box::new(MockPowerSupply::new()),
    }
}
