//! Device session: polling task, state machine and handle.
//!
//! ```no_run
//! use dps_panel::adapters::MockPowerSupply;
//! use dps_panel::channel::CommandChannel;
//! use dps_panel::protocol::{Function, TargetId};
//! use dps_panel::session::{Session, SessionOptions, StatusUpdate};
//!
//! # async fn demo() -> dps_panel::error::PanelResult<()> {
//! let channel = CommandChannel::new(Box::new(MockPowerSupply::new()), TargetId::new("mock"));
//! let (handle, _task) = Session::spawn(channel, SessionOptions::default(), |update: &StatusUpdate| {
//!     println!("{:?}", update);
//! });
//! handle.request_mode_change(Function::Cl).await?;
//! # Ok(())
//! # }
//! ```

pub mod handle;
pub mod observer;
mod poller;
pub mod state;

pub use handle::{SessionHandle, SessionRequest};
pub use observer::{ChannelObserver, NoopObserver, StatusObserver};
pub use state::{DisplayState, PowerState, SessionSnapshot, SessionState, StatusUpdate};

use crate::channel::CommandChannel;
use crate::config::PollingConfig;
use poller::Poller;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Interval between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);

const REQUEST_QUEUE_CAPACITY: usize = 32;

/// How a session polls.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    /// Send a ping before the first query.
    pub ping_on_start: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            ping_on_start: true,
        }
    }
}

impl From<&PollingConfig> for SessionOptions {
    fn from(polling: &PollingConfig) -> Self {
        Self {
            poll_interval: polling.interval(),
            ..Self::default()
        }
    }
}

/// Entry point for starting a device session.
pub struct Session;

impl Session {
    /// Spawn the polling task on the current Tokio runtime.
    ///
    /// The task runs for the life of the runtime; abort the returned
    /// `JoinHandle` to stop it early.
    pub fn spawn<O: StatusObserver>(
        channel: CommandChannel,
        options: SessionOptions,
        observer: O,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let poller = Poller::new(
            channel.clone(),
            observer,
            snapshot_tx,
            request_rx,
            options.poll_interval,
            options.ping_on_start,
        );
        let task = tokio::spawn(poller.run());

        (SessionHandle::new(request_tx, snapshot_rx, channel), task)
    }
}
