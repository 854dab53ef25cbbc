//! `dpsctl` process backend
//!
//! Runs the `dpsctl` command-line tool once per command and forwards its
//! standard output. `dpsctl` terminates with a non-zero status when it cannot
//! reach the unit; that exit is reported as [`DeviceAbort`].

use super::{DeviceAbort, DeviceLibrary};
use crate::protocol::{AddressedCommand, Command};
use std::io::Write;
use std::process::{Command as Process, Stdio};
use tracing::debug;

/// Device library backed by an external `dpsctl` executable.
#[derive(Debug, Clone)]
pub struct DpsctlProcess {
    /// Program path or name looked up in `PATH`
    program: String,
    /// Baud rate passed for serial targets
    baudrate: u32,
}

impl DpsctlProcess {
    pub fn new(program: impl Into<String>, baudrate: u32) -> Self {
        Self {
            program: program.into(),
            baudrate,
        }
    }

    /// Command line arguments for one addressed command.
    pub fn arguments(&self, command: &AddressedCommand) -> Vec<String> {
        let mut args = vec![
            "--device".to_string(),
            command.target.to_string(),
            "--baudrate".to_string(),
            self.baudrate.to_string(),
        ];
        match &command.command {
            Command::Ping => args.push("--ping".into()),
            Command::Query => args.push("--query".into()),
            Command::SetPower(on) => {
                args.push("--enable".into());
                args.push(if *on { "on" } else { "off" }.into());
            }
            Command::SetMode(function) => {
                args.push("--function".into());
                args.push(function.token().into());
            }
            Command::SetParameter(parameter) => {
                args.push("--parameter".into());
                args.push(parameter.assignment());
            }
            Command::Lock => args.push("--lock".into()),
            Command::Unlock => args.push("--unlock".into()),
        }
        args
    }
}

impl DeviceLibrary for DpsctlProcess {
    fn name(&self) -> &str {
        "dpsctl"
    }

    fn execute(
        &mut self,
        command: &AddressedCommand,
        out: &mut dyn Write,
    ) -> Result<(), DeviceAbort> {
        let args = self.arguments(command);
        debug!(program = %self.program, ?args, "Running dpsctl");

        let output = Process::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                DeviceAbort::new(None, format!("failed to run '{}': {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(DeviceAbort::new(output.status.code(), message));
        }

        out.write_all(&output.stdout)
            .map_err(|e| DeviceAbort::new(None, format!("failed to capture output: {}", e)))?;
        Ok(())
    }
}
