//! Intervalometer sequences through the fully wired controller.

use super::{Probe, ScriptedCamera, Script, WAIT, eventually};
use camctl::fsm::{IntervalometerState, ModeState};
use camctl::{Controller, ControllerConfig};
use camctl_common::events::{Event, Topic};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn controller() -> (Controller, Script, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ControllerConfig::default();
    config.device.download_dir = dir.path().to_path_buf();
    config.transport.enabled = false;
    config.timing.connection_retry_ms = 100;
    config.timing.error_retry_ms = 100;
    config.timing.recovery_grace_ms = 10;

    let (device, script) = ScriptedCamera::new();
    let controller = Controller::with_device(&config, Box::new(device)).unwrap();
    (controller, script, dir)
}

fn mode_is(mode: &str) -> impl Fn(&Event) -> bool + '_ {
    move |e| matches!(e, Event::ValueCurrentMode { mode: m } if m == mode)
}

#[test]
fn sequence_runs_to_completion_and_returns_to_manual() {
    let (mut controller, script, _dir) = controller();
    let broker = controller.broker();
    let camera_events = Probe::attach(&broker, &[Topic::CameraEvent]);
    let mode_events = Probe::attach(&broker, &[Topic::ModeState]);

    controller.start().unwrap();
    assert!(camera_events.wait_for(WAIT, |e| *e == Event::CameraReady).is_some());

    broker.post(
        Event::ModeIntervalometer {
            intervalms: 100,
            total_captures: 3,
        },
        Topic::RemoteCmd,
    );

    assert!(mode_events.wait_for(WAIT, mode_is("Intervalometer")).is_some());
    let finished = mode_events.wait_for(WAIT, |e| {
        matches!(e, Event::IntervalometerState { state, num_captures: 3, .. } if state == "ready")
    });
    assert_eq!(
        finished,
        Some(Event::IntervalometerState {
            state: "ready".to_string(),
            intervalms: 100,
            num_captures: 3,
            total_captures: 3,
        })
    );
    assert!(mode_events.wait_for(WAIT, mode_is("Manual")).is_some());

    assert_eq!(script.count("capture"), 3);
    assert!(eventually(WAIT, || controller.mode_state() == ModeState::ModeSelection));
    assert_eq!(controller.intervalometer_state(), IntervalometerState::Ready);
    controller.shutdown();
}

#[test]
fn stop_cancels_pending_shot() {
    let (mut controller, script, _dir) = controller();
    let broker = controller.broker();
    let camera_events = Probe::attach(&broker, &[Topic::CameraEvent]);
    let mode_events = Probe::attach(&broker, &[Topic::ModeState]);

    controller.start().unwrap();
    assert!(camera_events.wait_for(WAIT, |e| *e == Event::CameraReady).is_some());

    broker.post(
        Event::ModeIntervalometer {
            intervalms: 800,
            total_captures: 10,
        },
        Topic::RemoteCmd,
    );
    assert!(
        camera_events
            .wait_for(WAIT, |e| matches!(e, Event::CameraCaptureDone { .. }))
            .is_some()
    );

    broker.post(Event::ModeStop, Topic::RemoteCmd);
    assert!(mode_events.wait_for(WAIT, mode_is("Manual")).is_some());

    thread::sleep(Duration::from_millis(1200));
    assert_eq!(script.count("capture"), 1);
    assert_eq!(controller.intervalometer_state(), IntervalometerState::Ready);
    controller.shutdown();
}

#[test]
fn mode_query_answers_on_mode_state() {
    let (mut controller, _script, _dir) = controller();
    let broker = controller.broker();
    let mode_events = Probe::attach(&broker, &[Topic::ModeState]);

    controller.start().unwrap();
    broker.post(Event::GetCurrentMode, Topic::RemoteCmd);

    assert!(mode_events.wait_for(WAIT, mode_is("Manual")).is_some());
    assert!(
        mode_events
            .wait_for(WAIT, |e| matches!(e, Event::IntervalometerState { state, .. } if state == "ready"))
            .is_some()
    );
    controller.shutdown();
}
