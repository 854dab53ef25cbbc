//! OpenDPS text protocol.
//!
//! `status` decodes the line-oriented output of a status query; `command`
//! models what can be sent to the device.

pub mod command;
pub mod status;

pub use command::{AddressedCommand, Command, Function, Parameter, ParameterKind, TargetId};
pub use status::{parse, Mode, ParseError, StatusRecord};
