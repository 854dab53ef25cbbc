//! Core library for the dps-panel application.
//!
//! This library contains the device session core for OpenDPS programmable
//! power supplies: the status protocol decoder, the exclusive command channel,
//! the mode/power state machine and the polling task. The `dps-panel` binary
//! is a thin command-line observer on top of it.

pub mod adapters;
pub mod channel;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
