//! Session integration tests against the mock power supply.

use dps_panel::adapters::{Fault, MockPowerSupply};
use dps_panel::channel::CommandChannel;
use dps_panel::error::PanelError;
use dps_panel::protocol::{Command, Function, Mode, ParameterKind, TargetId};
use dps_panel::session::{
    ChannelObserver, NoopObserver, Session, SessionHandle, SessionOptions, SessionSnapshot,
    StatusUpdate,
};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(5);

fn options(poll_interval: Duration) -> SessionOptions {
    SessionOptions {
        poll_interval,
        ping_on_start: false,
    }
}

/// Session that polls once at start and then effectively never again.
async fn quiet_session(supply: &MockPowerSupply) -> (SessionHandle, JoinHandle<()>) {
    let channel = CommandChannel::new(Box::new(supply.clone()), TargetId::new("mock"));
    let (handle, task) = Session::spawn(channel, options(Duration::from_secs(3600)), NoopObserver);
    wait_for(&handle, |s| s.last_good_record.is_some()).await;
    supply.journal().clear();
    (handle, task)
}

async fn wait_for(
    handle: &SessionHandle,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut snapshots = handle.subscribe();
    let snapshot = tokio::time::timeout(WAIT, snapshots.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("session stopped")
        .clone();
    snapshot
}

async fn next_update(updates: &mut UnboundedReceiver<StatusUpdate>) -> StatusUpdate {
    tokio::time::timeout(WAIT, updates.recv())
        .await
        .expect("timed out waiting for update")
        .expect("observer channel closed")
}

#[tokio::test]
async fn test_mode_change_from_running_turns_output_off_first() {
    let supply = MockPowerSupply::new().with_output(Function::Cv, true);
    let (handle, _task) = quiet_session(&supply).await;
    assert!(handle.snapshot().power_on);

    assert_ok!(handle.request_mode_change(Function::Cl).await);

    assert_eq!(
        supply.journal().commands(),
        vec![Command::SetPower(false), Command::SetMode(Function::Cl)]
    );
    let snapshot = handle.snapshot();
    assert!(!snapshot.power_on);
    assert_eq!(snapshot.selected_mode, Some(Mode::Cl));
    assert_eq!(snapshot.pending_mode, Some(Function::Cl));
    assert!(snapshot.pending_command.is_none());
    assert_eq!(supply.function(), Function::Cl);
    assert!(!supply.output_on());
}

#[tokio::test]
async fn test_mode_change_to_current_mode_still_issues_both_commands() {
    let supply = MockPowerSupply::new().with_output(Function::Cv, false);
    let (handle, _task) = quiet_session(&supply).await;

    assert_ok!(handle.request_mode_change(Function::Cv).await);
    assert_eq!(
        supply.journal().commands(),
        vec![Command::SetPower(false), Command::SetMode(Function::Cv)]
    );
}

#[tokio::test]
async fn test_failed_mode_select_leaves_output_off() {
    let supply = MockPowerSupply::new().with_output(Function::Cv, true);
    let (handle, _task) = quiet_session(&supply).await;
    supply.fail_on(Command::SetMode(Function::Cl), Fault::Abort);

    let result = handle.request_mode_change(Function::Cl).await;
    assert!(matches!(result, Err(PanelError::DeviceCallAborted(_))));
    assert!(result.unwrap_err().is_recoverable());

    let snapshot = handle.snapshot();
    assert!(!snapshot.power_on);
    assert_eq!(snapshot.selected_mode, Some(Mode::Cv));
    assert!(snapshot.pending_mode.is_none());
    assert!(!supply.output_on());
    assert_eq!(supply.function(), Function::Cv);
}

#[tokio::test]
async fn test_function_generator_is_not_selectable() {
    let supply = MockPowerSupply::new();
    let (handle, _task) = quiet_session(&supply).await;

    let result = handle.request_mode_change(Function::Funcgen).await;
    assert!(matches!(
        result,
        Err(PanelError::UnsupportedMode(Function::Funcgen))
    ));
    assert!(supply.journal().commands().is_empty());
}

#[tokio::test]
async fn test_invalid_parameter_never_reaches_device() {
    let supply = MockPowerSupply::new();
    let (handle, _task) = quiet_session(&supply).await;

    let negative = handle.set_parameter(ParameterKind::Voltage, -1).await;
    assert!(matches!(negative, Err(PanelError::InvalidUserInput(_))));
    assert!(!negative.unwrap_err().is_recoverable());

    let text = handle
        .set_parameter_text(ParameterKind::Current, "lots")
        .await;
    assert_err!(text);

    assert!(supply.journal().commands().is_empty());
}

#[tokio::test]
async fn test_parameter_round_trip_shows_in_next_poll() {
    let supply = MockPowerSupply::new();
    let channel = CommandChannel::new(Box::new(supply.clone()), TargetId::new("mock"));
    let (handle, _task) =
        Session::spawn(channel, options(Duration::from_millis(20)), NoopObserver);
    wait_for(&handle, |s| s.last_good_record.is_some()).await;

    assert_ok!(handle.set_parameter(ParameterKind::Voltage, 3300).await);
    assert_ok!(handle.set_parameter_text(ParameterKind::Current, " 750 ").await);

    wait_for(&handle, |s| {
        s.last_good_record.as_ref().is_some_and(|record| {
            record.target_voltage_millivolts == 3300 && record.target_current_milliamps == 750
        })
    })
    .await;
}

#[tokio::test]
async fn test_toggle_switches_output() {
    let supply = MockPowerSupply::new().with_output(Function::Cv, false);
    let (handle, _task) = quiet_session(&supply).await;

    assert_ok!(handle.toggle_running().await);
    assert!(supply.output_on());
    assert!(handle.snapshot().power_on);

    assert_ok!(handle.toggle_running().await);
    assert!(!supply.output_on());
    assert_eq!(
        supply.journal().commands(),
        vec![Command::SetPower(true), Command::SetPower(false)]
    );
}

#[tokio::test]
async fn test_toggle_unavailable_in_constant_current() {
    let supply = MockPowerSupply::new().with_output(Function::Cc, false);
    let (handle, _task) = quiet_session(&supply).await;
    assert!(!handle.snapshot().toggle_available);

    let result = handle.toggle_running().await;
    assert!(matches!(
        result,
        Err(PanelError::ToggleUnavailable(Mode::Cc))
    ));
    assert!(supply.journal().commands().is_empty());
}

#[tokio::test]
async fn test_toggle_refused_until_first_good_poll() {
    let supply = MockPowerSupply::new().with_output(Function::Cc, true);
    supply.fail_next(Fault::Silent);

    let channel = CommandChannel::new(Box::new(supply.clone()), TargetId::new("mock"));
    let (observer, mut updates) = ChannelObserver::new();
    let (handle, _task) = Session::spawn(channel, options(Duration::from_secs(3600)), observer);
    assert!(next_update(&mut updates).await.is_comm_error());
    assert!(!handle.snapshot().toggle_available);

    let result = handle.toggle_running().await;
    assert!(matches!(
        result,
        Err(PanelError::ToggleUnavailable(Mode::Unknown))
    ));
    assert_eq!(supply.journal().commands(), vec![Command::Query]);
    assert!(supply.output_on());
}

#[tokio::test]
async fn test_lock_and_unlock() {
    let supply = MockPowerSupply::new();
    let (handle, _task) = quiet_session(&supply).await;

    assert_ok!(handle.set_locked(true).await);
    assert!(supply.is_locked());
    assert_ok!(handle.set_locked(false).await);
    assert!(!supply.is_locked());
    assert_eq!(
        supply.journal().commands(),
        vec![Command::Lock, Command::Unlock]
    );
}

#[tokio::test]
async fn test_empty_response_is_comm_error_then_recovers() {
    let supply = MockPowerSupply::new().with_output(Function::Cl, true);
    supply.fail_next(Fault::Silent);

    let channel = CommandChannel::new(Box::new(supply.clone()), TargetId::new("mock"));
    let (observer, mut updates) = ChannelObserver::new();
    let (handle, _task) = Session::spawn(channel, options(Duration::from_millis(20)), observer);

    match next_update(&mut updates).await {
        StatusUpdate::CommError { reason, .. } => assert!(reason.contains("mode marker")),
        other => panic!("expected a communication error, got {:?}", other),
    }

    match next_update(&mut updates).await {
        StatusUpdate::Record { record, display } => {
            assert_eq!(record.mode, Mode::Cl);
            let display = display.expect("CL is displayable");
            assert_eq!(display.mode_label, "CVCL");
        }
        other => panic!("expected a record, got {:?}", other),
    }

    wait_for(&handle, |s| s.comm_error.is_none() && s.displayed_record().is_some()).await;
}

#[tokio::test]
async fn test_library_panic_and_abort_keep_polling_alive() {
    let supply = MockPowerSupply::new();
    supply.fail_next(Fault::Panic);
    supply.fail_next(Fault::Abort);

    let channel = CommandChannel::new(Box::new(supply.clone()), TargetId::new("mock"));
    let (observer, mut updates) = ChannelObserver::new();
    let (handle, task) = Session::spawn(channel, options(Duration::from_millis(20)), observer);

    match next_update(&mut updates).await {
        StatusUpdate::CommError { reason, .. } => assert!(reason.contains("panicked")),
        other => panic!("expected a communication error, got {:?}", other),
    }
    match next_update(&mut updates).await {
        StatusUpdate::CommError { reason, .. } => assert!(reason.contains("could not connect")),
        other => panic!("expected a communication error, got {:?}", other),
    }
    assert!(matches!(
        next_update(&mut updates).await,
        StatusUpdate::Record { .. }
    ));

    assert!(!task.is_finished());
    assert_ok!(handle.toggle_running().await);
    assert!(supply.output_on());
}

#[tokio::test]
async fn test_comm_error_keeps_last_good_record() {
    let supply = MockPowerSupply::new();
    let channel = CommandChannel::new(Box::new(supply.clone()), TargetId::new("mock"));
    let (handle, _task) =
        Session::spawn(channel, options(Duration::from_millis(20)), NoopObserver);
    wait_for(&handle, |s| s.last_good_record.is_some()).await;

    supply.fail_next(Fault::Abort);
    let snapshot = wait_for(&handle, |s| s.comm_error.is_some()).await;
    assert!(snapshot.last_good_record.is_some());
    assert!(snapshot.displayed_record().is_none());
}

#[tokio::test]
async fn test_ping_through_handle() {
    let supply = MockPowerSupply::new();
    let (handle, _task) = quiet_session(&supply).await;

    let pong = assert_ok!(handle.ping().await);
    assert_eq!(pong.trim(), "Got pong from device");
    assert_eq!(supply.journal().commands(), vec![Command::Ping]);
}

#[tokio::test]
async fn test_dropped_session_reports_closed() {
    let supply = MockPowerSupply::new();
    let (handle, task) = quiet_session(&supply).await;

    task.abort();
    let _ = task.await;

    let result = handle.toggle_running().await;
    assert!(matches!(result, Err(PanelError::SessionClosed)));
}
