//! User-facing side of a running session.
//!
//! [`SessionHandle`] turns UI actions into [`SessionRequest`] messages for the
//! polling task, which owns the session state and runs the resulting device
//! commands. Input is validated here, before anything is queued.

use super::state::SessionSnapshot;
use crate::channel::CommandChannel;
use crate::error::{PanelError, PanelResult};
use crate::protocol::{Command, Function, Parameter, ParameterKind};
use tokio::sync::{mpsc, oneshot, watch};

/// Requests processed by the polling task.
#[derive(Debug)]
pub enum SessionRequest {
    /// Output off, then switch function
    ChangeMode {
        target: Function,
        response: oneshot::Sender<PanelResult<()>>,
    },

    /// Flip the output enable
    ToggleRunning {
        response: oneshot::Sender<PanelResult<()>>,
    },

    /// Apply an already validated setpoint
    SetParameter {
        parameter: Parameter,
        response: oneshot::Sender<PanelResult<()>>,
    },

    /// Lock or unlock the front panel
    SetLocked {
        locked: bool,
        response: oneshot::Sender<PanelResult<()>>,
    },
}

impl SessionRequest {
    pub fn change_mode(target: Function) -> (Self, oneshot::Receiver<PanelResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::ChangeMode { target, response: tx }, rx)
    }

    pub fn toggle_running() -> (Self, oneshot::Receiver<PanelResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::ToggleRunning { response: tx }, rx)
    }

    pub fn set_parameter(parameter: Parameter) -> (Self, oneshot::Receiver<PanelResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::SetParameter {
                parameter,
                response: tx,
            },
            rx,
        )
    }

    pub fn set_locked(locked: bool) -> (Self, oneshot::Receiver<PanelResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::SetLocked { locked, response: tx }, rx)
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<SessionRequest>,
    snapshots: watch::Receiver<SessionSnapshot>,
    channel: CommandChannel,
}

impl SessionHandle {
    pub(crate) fn new(
        requests: mpsc::Sender<SessionRequest>,
        snapshots: watch::Receiver<SessionSnapshot>,
        channel: CommandChannel,
    ) -> Self {
        Self {
            requests,
            snapshots,
            channel,
        }
    }

    /// Switch the device to `target`, dropping the output first.
    pub async fn request_mode_change(&self, target: Function) -> PanelResult<()> {
        self.send(SessionRequest::change_mode(target)).await
    }

    /// Start or stop the output. Not available in CC or function-generator mode.
    pub async fn toggle_running(&self) -> PanelResult<()> {
        self.send(SessionRequest::toggle_running()).await
    }

    /// Set a target value in milli-units. Negative values are rejected
    /// without contacting the device.
    pub async fn set_parameter(&self, kind: ParameterKind, value: i64) -> PanelResult<()> {
        let parameter = Parameter::new(kind, value)?;
        self.send(SessionRequest::set_parameter(parameter)).await
    }

    /// Like [`set_parameter`](Self::set_parameter) for text typed by the user.
    pub async fn set_parameter_text(&self, kind: ParameterKind, text: &str) -> PanelResult<()> {
        let parameter = Parameter::parse(kind, text)?;
        self.send(SessionRequest::set_parameter(parameter)).await
    }

    pub async fn set_locked(&self, locked: bool) -> PanelResult<()> {
        self.send(SessionRequest::set_locked(locked)).await
    }

    /// Round trip to the device outside the polling task.
    pub async fn ping(&self) -> PanelResult<String> {
        self.channel.execute(Command::ping()).await.into_result()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    async fn send(
        &self,
        (request, response): (SessionRequest, oneshot::Receiver<PanelResult<()>>),
    ) -> PanelResult<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| PanelError::SessionClosed)?;
        response.await.map_err(|_| PanelError::SessionClosed)?
    }
}
