//! Camera controller actor against a scripted device.

use super::{Probe, ScriptedCamera, Script, WAIT, eventually, fast_settings, status_name};
use camctl::fsm::camera::{self, CameraController, CameraSettings, CameraState};
use camctl_common::events::{Event, Topic};
use camctl_runtime::broker::EventBroker;
use camctl_runtime::hsm_actor::StateMachineActor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Bench {
    broker: Arc<EventBroker>,
    camera: StateMachineActor<CameraController>,
    events: Probe,
    config: Probe,
    script: Script,
    _dir: TempDir,
}

impl Bench {
    fn start(device: ScriptedCamera, script: Script, settings: impl FnOnce(&Path) -> CameraSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(EventBroker::new());
        broker.start().unwrap();
        let events = Probe::attach(&broker, &[Topic::CameraEvent]);
        let config = Probe::attach(&broker, &[Topic::CameraConfig]);
        let mut camera = StateMachineActor::new(
            CameraController::new(Box::new(device), settings(dir.path())),
            Arc::clone(&broker),
            camera::TOPICS,
        );
        camera.start().unwrap();
        Self {
            broker,
            camera,
            events,
            config,
            script,
            _dir: dir,
        }
    }

    fn with_defaults() -> Self {
        let (device, script) = ScriptedCamera::new();
        Self::start(device, script, fast_settings)
    }

    fn send(&self, event: Event) {
        self.broker.post(event, Topic::CameraCmd);
    }

    fn connect(&self) {
        self.send(Event::CameraCmdConnect);
        assert!(self.events.wait_for(WAIT, |e| *e == Event::CameraReady).is_some());
    }
}

impl Drop for Bench {
    fn drop(&mut self) {
        self.camera.stop();
        self.broker.stop();
    }
}

#[test]
fn connect_refreshes_then_setter_broadcasts_new_value() {
    let bench = Bench::with_defaults();
    bench.send(Event::CameraCmdConnect);

    assert!(bench.events.wait_for(WAIT, |e| *e == Event::CameraConnected).is_some());
    assert!(bench.events.wait_for(WAIT, |e| *e == Event::CameraReady).is_some());
    assert!(
        bench
            .config
            .wait_for(WAIT, |e| *e == Event::ConfigValueAperture { aperture: 560 })
            .is_some()
    );

    bench.send(Event::ConfigSetAperture { aperture: 800 });
    assert!(
        bench
            .config
            .wait_for(WAIT, |e| *e == Event::ConfigValueAperture { aperture: 800 })
            .is_some()
    );
    assert_eq!(bench.script.count("set_aperture 800"), 1);
    assert_eq!(bench.camera.current_state(), CameraState::Ready);
}

#[test]
fn capture_without_download_reports_and_returns_to_ready() {
    let bench = Bench::with_defaults();
    bench.connect();

    bench.send(Event::CameraCmdCapture);
    let seen = bench.events.collect_until(WAIT, |e| matches!(e, Event::CameraCaptureDone { .. }));
    assert_eq!(
        seen.last(),
        Some(&Event::CameraCaptureDone {
            downloaded: false,
            file: String::new(),
        })
    );
    assert!(seen.iter().filter_map(status_name).any(|s| s == "capturing"));

    let ready = bench.events.wait_for(WAIT, |e| status_name(e) == Some("ready"));
    assert!(ready.is_some());
    assert_eq!(bench.script.count("capture"), 1);
    assert!(eventually(WAIT, || bench.camera.current_state() == CameraState::Ready));
}

#[test]
fn capture_with_download_stores_file_locally() {
    let (device, script) = ScriptedCamera::new();
    let bench = Bench::start(device, script, |dir| CameraSettings {
        download: true,
        ..fast_settings(dir)
    });
    bench.connect();

    bench.send(Event::CameraCmdCapture);
    let done = bench
        .events
        .wait_for(WAIT, |e| matches!(e, Event::CameraCaptureDone { .. }))
        .unwrap();
    let Event::CameraCaptureDone { downloaded, file } = done else {
        unreachable!()
    };
    assert!(downloaded);
    assert!(file.ends_with("IMG_0001.JPG"));
    assert!(Path::new(&file).is_file());
    assert_eq!(bench.script.count("download IMG_0001.JPG"), 1);
}

#[test]
fn setter_during_capture_runs_after_capture_completes() {
    let (device, script) = ScriptedCamera::new();
    let device = device.with_capture_delay(Duration::from_millis(150));
    let bench = Bench::start(device, script, fast_settings);
    bench.connect();

    bench.send(Event::CameraCmdCapture);
    bench.send(Event::ConfigSetIso { iso: 400 });

    assert!(
        bench
            .config
            .wait_for(WAIT, |e| *e == Event::ConfigValueIso { iso: 400 })
            .is_some()
    );
    let capture = bench.script.position("capture").unwrap();
    let set_iso = bench.script.position("set_iso 400").unwrap();
    assert!(capture < set_iso, "calls: {:?}", bench.script.calls());
}

#[test]
fn failed_connection_keeps_retrying() {
    let (device, script) = ScriptedCamera::new();
    script.fail_connects(u32::MAX);
    let bench = Bench::start(device, script, fast_settings);

    bench.send(Event::CameraCmdConnect);
    for _ in 0..3 {
        assert!(
            bench
                .events
                .wait_for(WAIT, |e| *e == Event::CameraConnectionError)
                .is_some()
        );
    }
    assert_eq!(bench.camera.current_state(), CameraState::ConnectionError);
    assert!(bench.script.count("connect") >= 3);
}

#[test]
fn connection_recovers_once_camera_appears() {
    let (device, script) = ScriptedCamera::new();
    script.fail_connects(2);
    let bench = Bench::start(device, script, fast_settings);

    bench.send(Event::CameraCmdConnect);
    let seen = bench.events.collect_until(WAIT, |e| *e == Event::CameraReady);
    assert_eq!(seen.last(), Some(&Event::CameraReady));
    let failures = seen.iter().filter(|e| **e == Event::CameraConnectionError).count();
    assert_eq!(failures, 2);
    assert_eq!(bench.script.count("connect"), 3);
}

#[test]
fn capture_failure_recovers_by_reconnecting() {
    let bench = Bench::with_defaults();
    bench.connect();
    bench.script.fail_captures(1);

    bench.send(Event::CameraCmdCapture);
    assert!(bench.events.wait_for(WAIT, |e| *e == Event::CameraError).is_some());
    assert!(bench.events.wait_for(WAIT, |e| *e == Event::CameraReady).is_some());

    let calls = bench.script.calls();
    let capture = calls.iter().position(|c| c == "capture").unwrap();
    assert!(calls[capture..].iter().any(|c| c == "disconnect"));
    assert!(calls[capture..].iter().any(|c| c == "connect"));
}

#[test]
fn status_request_reports_current_state() {
    let bench = Bench::with_defaults();
    bench.connect();

    bench.send(Event::CameraCmdDownload { download: true });
    bench.send(Event::GetCameraControllerState);
    let status = bench.events.wait_for(WAIT, |e| {
        matches!(e, Event::CameraControllerState { download: true, .. })
    });
    assert_eq!(
        status,
        Some(Event::CameraControllerState {
            state: "ready".to_string(),
            camera_connected: true,
            download: true,
        })
    );
}

#[test]
fn disconnect_from_ready() {
    let bench = Bench::with_defaults();
    bench.connect();

    bench.send(Event::CameraCmdDisconnect);
    assert!(bench.events.wait_for(WAIT, |e| *e == Event::CameraDisconnected).is_some());
    assert!(eventually(WAIT, || bench.camera.current_state() == CameraState::Disconnected));
    assert_eq!(bench.script.count("disconnect"), 1);
}
