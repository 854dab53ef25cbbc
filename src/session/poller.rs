//! Polling loop.
//!
//! One task per device. It owns [`SessionState`], queries the device at a
//! fixed interval and serves [`SessionRequest`]s in between ticks. A failed
//! poll only changes what is displayed; the loop itself never ends on error.

use super::handle::SessionRequest;
use super::observer::StatusObserver;
use super::state::{SessionSnapshot, SessionState, StatusUpdate};
use crate::channel::{CommandChannel, DeviceResponse};
use crate::error::PanelResult;
use crate::protocol::{self, Command, Function, ParseError};
use chrono::Local;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub(crate) struct Poller<O> {
    channel: CommandChannel,
    state: SessionState,
    observer: O,
    snapshots: watch::Sender<SessionSnapshot>,
    requests: mpsc::Receiver<SessionRequest>,
    interval: Duration,
    ping_on_start: bool,
}

impl<O: StatusObserver> Poller<O> {
    pub(crate) fn new(
        channel: CommandChannel,
        observer: O,
        snapshots: watch::Sender<SessionSnapshot>,
        requests: mpsc::Receiver<SessionRequest>,
        interval: Duration,
        ping_on_start: bool,
    ) -> Self {
        Self {
            channel,
            state: SessionState::new(),
            observer,
            snapshots,
            requests,
            interval,
            ping_on_start,
        }
    }

    /// Runs until the task is dropped or the process exits.
    pub(crate) async fn run(mut self) {
        info!(interval_ms = self.interval.as_millis() as u64, "Device session started");

        if self.ping_on_start {
            let response = self.execute(Command::ping()).await;
            match response.abort_reason() {
                None => info!("Ping: {}", response.text().trim()),
                Some(reason) => warn!("Ping failed: {}", reason),
            }
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut requests_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once().await,
                request = self.requests.recv(), if requests_open => match request {
                    Some(request) => self.handle_request(request).await,
                    None => {
                        debug!("All session handles dropped, polling continues");
                        requests_open = false;
                    }
                },
            }
        }
    }

    async fn poll_once(&mut self) {
        let response = self.execute(Command::query()).await;
        let update = match protocol::parse(response.text()) {
            Ok(record) => {
                if self.state.comm_error().is_some() {
                    info!("Device communication restored");
                }
                self.state.record_success(record)
            }
            Err(error) => self.comm_failure(&response, &error),
        };
        self.observer.on_status_update(&update);
        self.publish();
    }

    fn comm_failure(&mut self, response: &DeviceResponse, error: &ParseError) -> StatusUpdate {
        if self.state.comm_error().is_none() {
            warn!(
                aborted = response.is_aborted(),
                "Communication error: {}",
                response.abort_reason().map_or_else(|| error.to_string(), str::to_string)
            );
        } else {
            debug!("Communication error persists: {}", error);
        }
        let mut update = self.state.record_failure(error, Local::now());
        if let (StatusUpdate::CommError { reason, .. }, Some(abort)) =
            (&mut update, response.abort_reason())
        {
            *reason = abort.to_string();
        }
        update
    }

    /// The snapshot is published before the caller hears back, so a caller
    /// reading it after the reply sees the effect of its own request.
    async fn handle_request(&mut self, request: SessionRequest) {
        let (result, response) = match request {
            SessionRequest::ChangeMode { target, response } => {
                (self.change_mode(target).await, response)
            }
            SessionRequest::ToggleRunning { response } => (self.toggle_running().await, response),
            SessionRequest::SetParameter {
                parameter,
                response,
            } => (self.issue(Command::set_parameter(parameter)).await, response),
            SessionRequest::SetLocked { locked, response } => {
                (self.issue(Command::lock(locked)).await, response)
            }
        };
        if let Err(error) = &result {
            debug!("Request failed: {}", error);
        }
        self.publish();
        let _ = response.send(result);
    }

    async fn change_mode(&mut self, target: Function) -> PanelResult<()> {
        let [power_off, select] = self.state.plan_mode_change(target)?;
        info!(from = %self.state.selected_mode(), to = %target, "Changing mode");

        self.issue(power_off).await?;
        self.state.apply_power(false);
        self.publish();

        self.issue(select).await?;
        self.state.apply_mode_selected(target);
        Ok(())
    }

    async fn toggle_running(&mut self) -> PanelResult<()> {
        let command = self.state.plan_toggle()?;
        let on = matches!(command, Command::SetPower(true));
        self.issue(command).await?;
        self.state.apply_power(on);
        info!(running = on, "Output toggled");
        Ok(())
    }

    async fn issue(&mut self, command: Command) -> PanelResult<()> {
        self.execute(command).await.into_result().map(|_| ())
    }

    async fn execute(&mut self, command: Command) -> DeviceResponse {
        self.state.begin_command(command.clone());
        let response = self.channel.execute(command).await;
        self.state.finish_command();
        response
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.state.snapshot());
    }
}
