//! Observer side of the session.
//!
//! The polling task calls the observer once per poll with the outcome. Any
//! `FnMut(&StatusUpdate)` closure works; [`ChannelObserver`] forwards updates
//! into an unbounded channel for consumers that prefer to `recv().await`.

use super::state::StatusUpdate;
use tokio::sync::mpsc;

/// Receives status updates at poll cadence.
pub trait StatusObserver: Send + 'static {
    fn on_status_update(&mut self, update: &StatusUpdate);
}

impl<F> StatusObserver for F
where
    F: FnMut(&StatusUpdate) + Send + 'static,
{
    fn on_status_update(&mut self, update: &StatusUpdate) {
        self(update)
    }
}

/// Observer that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StatusObserver for NoopObserver {
    fn on_status_update(&mut self, _update: &StatusUpdate) {}
}

/// Forwards updates into an unbounded channel. A dropped receiver is ignored.
#[derive(Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusObserver for ChannelObserver {
    fn on_status_update(&mut self, update: &StatusUpdate) {
        let _ = self.tx.send(update.clone());
    }
}
