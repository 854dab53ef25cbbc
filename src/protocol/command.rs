//! Commands understood by the device library.
//!
//! A [`Command`] is an immutable value; every kind has a builder function so
//! callers never assemble one field by field. The command channel wraps it in
//! an [`AddressedCommand`] carrying the target device before dispatch.

use crate::error::{PanelError, PanelResult};
use crate::protocol::status::Mode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serial device path or network address of an OpenDPS unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A function the device can be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Function {
    Cv,
    Cl,
    Cc,
    Funcgen,
}

impl Function {
    /// Token used on the wire (`cv`, `cl`, `cc`, `funcgen`).
    pub fn token(self) -> &'static str {
        match self {
            Function::Cv => "cv",
            Function::Cl => "cl",
            Function::Cc => "cc",
            Function::Funcgen => "funcgen",
        }
    }

    /// The mode a status record reports once this function is active.
    pub fn mode(self) -> Mode {
        match self {
            Function::Cv => Mode::Cv,
            Function::Cl => Mode::Cl,
            Function::Cc => Mode::Cc,
            Function::Funcgen => Mode::Funcgen,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Function {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cv" => Ok(Function::Cv),
            "cl" => Ok(Function::Cl),
            "cc" => Ok(Function::Cc),
            "funcgen" => Ok(Function::Funcgen),
            other => Err(PanelError::InvalidUserInput(format!(
                "unknown function '{}' (expected cv, cl, cc or funcgen)",
                other
            ))),
        }
    }
}

/// Settable target values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Voltage,
    Current,
}

impl ParameterKind {
    pub fn name(self) -> &'static str {
        match self {
            ParameterKind::Voltage => "voltage",
            ParameterKind::Current => "current",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterKind {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voltage" | "v" => Ok(ParameterKind::Voltage),
            "current" | "i" => Ok(ParameterKind::Current),
            other => Err(PanelError::InvalidUserInput(format!(
                "unknown parameter '{}' (expected voltage or current)",
                other
            ))),
        }
    }
}

/// A validated parameter assignment, value in milli-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Parameter {
    kind: ParameterKind,
    value: u32,
}

impl Parameter {
    /// Validate a user supplied value. Negative or out-of-range values are
    /// rejected as [`PanelError::InvalidUserInput`].
    pub fn new(kind: ParameterKind, value: i64) -> PanelResult<Self> {
        if value < 0 {
            return Err(PanelError::InvalidUserInput(format!(
                "{} must be a non-negative integer, got {}",
                kind, value
            )));
        }
        let value = u32::try_from(value).map_err(|_| {
            PanelError::InvalidUserInput(format!("{} value {} is out of range", kind, value))
        })?;
        Ok(Self { kind, value })
    }

    /// Validate a value as typed by the user, e.g. `"3300"`.
    pub fn parse(kind: ParameterKind, text: &str) -> PanelResult<Self> {
        let value = text.trim().parse::<i64>().map_err(|_| {
            PanelError::InvalidUserInput(format!(
                "{} must be an integer in milli-units, got '{}'",
                kind,
                text.trim()
            ))
        })?;
        Self::new(kind, value)
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// `name=value` form the library expects, e.g. `voltage=3300`.
    pub fn assignment(&self) -> String {
        format!("{}={}", self.kind.name(), self.value)
    }
}

/// One request to the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Ping,
    Query,
    SetPower(bool),
    SetMode(Function),
    SetParameter(Parameter),
    Lock,
    Unlock,
}

impl Command {
    pub fn ping() -> Self {
        Command::Ping
    }

    pub fn query() -> Self {
        Command::Query
    }

    pub fn set_power(on: bool) -> Self {
        Command::SetPower(on)
    }

    pub fn set_mode(function: Function) -> Self {
        Command::SetMode(function)
    }

    pub fn set_parameter(parameter: Parameter) -> Self {
        Command::SetParameter(parameter)
    }

    pub fn lock(locked: bool) -> Self {
        if locked {
            Command::Lock
        } else {
            Command::Unlock
        }
    }

    /// Address this command to a device.
    pub fn to(self, target: TargetId) -> AddressedCommand {
        AddressedCommand {
            target,
            command: self,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ping => f.write_str("ping"),
            Command::Query => f.write_str("query"),
            Command::SetPower(on) => write!(f, "power {}", if *on { "on" } else { "off" }),
            Command::SetMode(function) => write!(f, "function {}", function),
            Command::SetParameter(parameter) => write!(f, "parameter {}", parameter.assignment()),
            Command::Lock => f.write_str("lock"),
            Command::Unlock => f.write_str("unlock"),
        }
    }
}

/// A command stamped with the device it is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressedCommand {
    pub target: TargetId,
    pub command: Command,
}
