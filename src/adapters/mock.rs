//! Mock OpenDPS power supply for testing without hardware.
//!
//! Answers status queries in the same layout `dpsctl --query` prints, keeps
//! its own output/function/setpoint state, records every command it receives
//! and can be told to fail. Clones share state, so a test keeps one clone as a
//! control handle while the other lives inside the command channel.

use super::{DeviceAbort, DeviceLibrary};
use crate::protocol::{AddressedCommand, Command, Function, ParameterKind};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Simulated load resistance used to derive the output current.
const LOAD_MILLIOHMS: u64 = 10_000;

/// Failure injected into the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Return a hard-exit signal.
    Abort,
    /// Panic inside the library call.
    Panic,
    /// Print nothing at all.
    Silent,
}

#[derive(Debug)]
struct SupplyState {
    function: Function,
    output_on: bool,
    voltage_mv: u32,
    current_ma: u32,
    input_mv: u32,
    locked: bool,
    faults: Vec<(Option<Command>, Fault)>,
}

impl Default for SupplyState {
    fn default() -> Self {
        Self {
            function: Function::Cv,
            output_on: false,
            voltage_mv: 5000,
            current_ma: 1000,
            input_mv: 12_100,
            locked: false,
            faults: Vec::new(),
        }
    }
}

impl SupplyState {
    fn take_fault(&mut self, command: &Command) -> Option<Fault> {
        let index = self
            .faults
            .iter()
            .position(|(trigger, _)| trigger.as_ref().map_or(true, |t| t == command))?;
        Some(self.faults.remove(index).1)
    }

    fn output_mv(&self) -> u32 {
        if !self.output_on {
            return 0;
        }
        match self.function {
            Function::Cc => {
                let mv = u64::from(self.current_ma) * LOAD_MILLIOHMS / 1000;
                u32::try_from(mv).unwrap_or(u32::MAX).min(self.voltage_mv)
            }
            _ => self.voltage_mv,
        }
    }

    fn output_ma(&self) -> u32 {
        let ma = u64::from(self.output_mv()) * 1000 / LOAD_MILLIOHMS;
        u32::try_from(ma).unwrap_or(u32::MAX).min(self.current_ma)
    }

    fn write_status(&self, out: &mut dyn Write) -> std::io::Result<()> {
        let state = if self.output_on { "on" } else { "off" };
        writeln!(out, "Func       : {} ({})", self.function.token(), state)?;
        if self.function == Function::Funcgen {
            return Ok(());
        }
        writeln!(out, "  voltage  : {}", self.voltage_mv)?;
        writeln!(out, "  current  : {}", self.current_ma)?;
        writeln!(out, "V_in       : {}", volts(self.input_mv))?;
        writeln!(out, "V_out      : {}", volts(self.output_mv()))?;
        writeln!(out, "I_out      : {:.3} A", f64::from(self.output_ma()) / 1000.0)?;
        Ok(())
    }
}

fn volts(mv: u32) -> String {
    format!("{:.2} V", f64::from(mv) / 1000.0)
}

/// Shared log of every command a [`MockPowerSupply`] executed.
#[derive(Debug, Clone, Default)]
pub struct MockJournal {
    entries: Arc<Mutex<Vec<AddressedCommand>>>,
}

impl MockJournal {
    pub fn entries(&self) -> Vec<AddressedCommand> {
        self.entries.lock().clone()
    }

    /// Executed commands without their target.
    pub fn commands(&self) -> Vec<Command> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.command.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn push(&self, command: AddressedCommand) {
        self.entries.lock().push(command);
    }
}

/// Simulated power supply implementing [`DeviceLibrary`].
#[derive(Debug, Clone, Default)]
pub struct MockPowerSupply {
    state: Arc<Mutex<SupplyState>>,
    journal: MockJournal,
}

impl MockPowerSupply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start in the given function with the output enabled or not.
    pub fn with_output(self, function: Function, on: bool) -> Self {
        {
            let mut state = self.state.lock();
            state.function = function;
            state.output_on = on;
        }
        self
    }

    pub fn journal(&self) -> MockJournal {
        self.journal.clone()
    }

    /// Fail the next call, whatever the command.
    pub fn fail_next(&self, fault: Fault) {
        self.state.lock().faults.push((None, fault));
    }

    /// Fail the next call of exactly this command.
    pub fn fail_on(&self, command: Command, fault: Fault) {
        self.state.lock().faults.push((Some(command), fault));
    }

    pub fn output_on(&self) -> bool {
        self.state.lock().output_on
    }

    pub fn function(&self) -> Function {
        self.state.lock().function
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }
}

impl DeviceLibrary for MockPowerSupply {
    fn name(&self) -> &str {
        "mock"
    }

    #[allow(clippy::panic)]
    fn execute(
        &mut self,
        command: &AddressedCommand,
        out: &mut dyn Write,
    ) -> Result<(), DeviceAbort> {
        self.journal.push(command.clone());

        let fault = self.state.lock().take_fault(&command.command);
        match fault {
            Some(Fault::Abort) => {
                return Err(DeviceAbort::new(
                    Some(1),
                    format!("Error: could not connect to {}", command.target),
                ))
            }
            Some(Fault::Panic) => panic!("mock device library crashed on {}", command.command),
            Some(Fault::Silent) => return Ok(()),
            None => {}
        }

        let mut state = self.state.lock();
        let written = match &command.command {
            Command::Ping => writeln!(out, "Got pong from device"),
            Command::Query => state.write_status(out),
            Command::SetPower(on) => {
                state.output_on = *on;
                Ok(())
            }
            Command::SetMode(function) => {
                state.function = *function;
                Ok(())
            }
            Command::SetParameter(parameter) => {
                match parameter.kind() {
                    ParameterKind::Voltage => state.voltage_mv = parameter.value(),
                    ParameterKind::Current => state.current_ma = parameter.value(),
                }
                Ok(())
            }
            Command::Lock => {
                state.locked = true;
                Ok(())
            }
            Command::Unlock => {
                state.locked = false;
                Ok(())
            }
        };
        written.map_err(|e| DeviceAbort::new(None, format!("output capture failed: {}", e)))
    }
}
