//! Mode / power state machine.
//!
//! [`SessionState`] is owned by the polling task. It folds status records
//! into a local view, plans the command sequences for user requests and
//! derives what a display should show. It never talks to the device itself.

use crate::error::{PanelError, PanelResult};
use crate::protocol::{Command, Function, Mode, ParseError, StatusRecord};
use chrono::{DateTime, Local};
use serde::Serialize;

/// Output state of the device in a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Stopped(Mode),
    Running(Mode),
}

/// Labels and affordances derived from one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    /// `CV`, `CL`, `CC`, `UNKNOWN`, or `CVCL` for a CL device that is
    /// delivering output.
    pub mode_label: &'static str,
    /// `Running` or `Stopped`.
    pub running_label: &'static str,
    pub toggle_available: bool,
}

impl DisplayState {
    /// `None` for function-generator records, which are shown as-is.
    pub fn derive(record: &StatusRecord) -> Option<Self> {
        if record.mode == Mode::Funcgen {
            return None;
        }
        let mode_label = match (record.mode, record.power_on) {
            (Mode::Cl, true) => "CVCL",
            (mode, _) => mode.label(),
        };
        Some(Self {
            mode_label,
            running_label: if record.power_on { "Running" } else { "Stopped" },
            toggle_available: toggle_available(record.mode),
        })
    }
}

fn toggle_available(mode: Mode) -> bool {
    !matches!(mode, Mode::Cc | Mode::Funcgen)
}

/// What the observer receives once per poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusUpdate {
    Record {
        record: StatusRecord,
        display: Option<DisplayState>,
    },
    /// No usable answer; numeric displays are blanked until the next record.
    CommError { at: DateTime<Local>, reason: String },
}

impl StatusUpdate {
    pub fn is_comm_error(&self) -> bool {
        matches!(self, StatusUpdate::CommError { .. })
    }
}

/// Immutable copy of the session published after every change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub last_good_record: Option<StatusRecord>,
    pub comm_error: Option<DateTime<Local>>,
    pub selected_mode: Option<Mode>,
    pub pending_mode: Option<Function>,
    pub pending_command: Option<Command>,
    pub power_on: bool,
    pub toggle_available: bool,
}

impl SessionSnapshot {
    /// Record to show, or `None` while a communication error is active.
    pub fn displayed_record(&self) -> Option<&StatusRecord> {
        if self.comm_error.is_some() {
            None
        } else {
            self.last_good_record.as_ref()
        }
    }
}

/// Mutable session owned by the polling task.
#[derive(Debug, Default)]
pub struct SessionState {
    last_good_record: Option<StatusRecord>,
    comm_error: Option<DateTime<Local>>,
    selected_mode: Option<Mode>,
    pending_mode: Option<Function>,
    pending_command: Option<Command>,
    power_on: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_good_record(&self) -> Option<&StatusRecord> {
        self.last_good_record.as_ref()
    }

    pub fn comm_error(&self) -> Option<DateTime<Local>> {
        self.comm_error
    }

    /// Mode shown to the user; the requested one while a change is in flight.
    pub fn selected_mode(&self) -> Mode {
        self.selected_mode.unwrap_or(Mode::Unknown)
    }

    pub fn power_on(&self) -> bool {
        self.power_on
    }

    pub fn pending_command(&self) -> Option<&Command> {
        self.pending_command.as_ref()
    }

    pub fn power_state(&self) -> PowerState {
        if self.power_on {
            PowerState::Running(self.selected_mode())
        } else {
            PowerState::Stopped(self.selected_mode())
        }
    }

    /// False until a poll has succeeded and while a communication error is
    /// active; the device state is unknown then.
    pub fn toggle_available(&self) -> bool {
        self.last_good_record.is_some()
            && self.comm_error.is_none()
            && toggle_available(self.selected_mode())
    }

    /// Fold in a successful poll.
    pub fn record_success(&mut self, record: StatusRecord) -> StatusUpdate {
        self.comm_error = None;
        self.power_on = record.power_on;
        self.selected_mode = Some(record.mode);
        self.pending_mode = None;
        self.last_good_record = Some(record.clone());
        let display = DisplayState::derive(&record);
        StatusUpdate::Record { record, display }
    }

    /// Enter (or stay in) the communication-error state.
    pub fn record_failure(&mut self, error: &ParseError, at: DateTime<Local>) -> StatusUpdate {
        self.comm_error = Some(at);
        StatusUpdate::CommError {
            at,
            reason: error.to_string(),
        }
    }

    /// Commands for a mode change: output off first, then the new function.
    pub fn plan_mode_change(&self, target: Function) -> PanelResult<[Command; 2]> {
        if target == Function::Funcgen {
            return Err(PanelError::UnsupportedMode(target));
        }
        Ok([Command::set_power(false), Command::set_mode(target)])
    }

    /// Command that flips the output, if the current mode allows it.
    pub fn plan_toggle(&self) -> PanelResult<Command> {
        if !self.toggle_available() {
            return Err(PanelError::ToggleUnavailable(self.selected_mode()));
        }
        Ok(Command::set_power(!self.power_on))
    }

    pub fn apply_power(&mut self, on: bool) {
        self.power_on = on;
    }

    pub fn apply_mode_selected(&mut self, function: Function) {
        self.selected_mode = Some(function.mode());
        self.pending_mode = Some(function);
    }

    pub fn begin_command(&mut self, command: Command) {
        self.pending_command = Some(command);
    }

    pub fn finish_command(&mut self) {
        self.pending_command = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            last_good_record: self.last_good_record.clone(),
            comm_error: self.comm_error,
            selected_mode: self.selected_mode,
            pending_mode: self.pending_mode,
            pending_command: self.pending_command.clone(),
            power_on: self.power_on,
            toggle_available: self.toggle_available(),
        }
    }
}
