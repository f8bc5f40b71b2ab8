//! Shared fixtures: a scriptable camera and broker probes.

pub mod camera_scenarios;
pub mod intervalometer;
pub mod transport;

use camctl::fsm::CameraSettings;
use camctl_common::device::{CameraPath, Device, DeviceError};
use camctl_common::events::{Event, Topic};
use camctl_runtime::broker::EventBroker;
use camctl_runtime::mailbox::{Mailbox, Message};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(3);

/// Handles kept by the test after the camera is moved into an actor.
#[derive(Clone, Default)]
pub struct Script {
    log: Arc<Mutex<Vec<String>>>,
    connect_failures: Arc<AtomicU32>,
    capture_failures: Arc<AtomicU32>,
}

impl Script {
    /// Fail the next `n` connection attempts. `u32::MAX` fails forever.
    pub fn fail_connects(&self, n: u32) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_captures(&self, n: u32) {
        self.capture_failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.log.lock().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.log.lock().iter().position(|c| c == call)
    }

    fn record(&self, call: impl Into<String>) {
        self.log.lock().push(call.into());
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

/// In-memory camera that records every call it receives.
pub struct ScriptedCamera {
    script: Script,
    capture_delay: Duration,
    connected: bool,
    aperture: i32,
    iso: i32,
    target: String,
    shots: u32,
}

impl ScriptedCamera {
    pub fn new() -> (Self, Script) {
        let script = Script::default();
        let camera = Self {
            script: script.clone(),
            capture_delay: Duration::from_millis(10),
            connected: false,
            aperture: 560,
            iso: 100,
            target: "Internal RAM".to_string(),
            shots: 0,
        };
        (camera, script)
    }

    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    fn online(&self) -> Result<(), DeviceError> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }
}

impl Device for ScriptedCamera {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn connect(&mut self) -> Result<String, DeviceError> {
        self.script.record("connect");
        if Script::take_failure(&self.script.connect_failures) {
            return Err(DeviceError::Communication("no camera on the bus".to_string()));
        }
        self.connected = true;
        Ok("scripted-0".to_string())
    }

    fn disconnect(&mut self) {
        self.script.record("disconnect");
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn capture(&mut self) -> Result<CameraPath, DeviceError> {
        self.online()?;
        self.script.record("capture");
        thread::sleep(self.capture_delay);
        if Script::take_failure(&self.script.capture_failures) {
            self.connected = false;
            return Err(DeviceError::Communication("shutter jammed".to_string()));
        }
        self.shots += 1;
        Ok(CameraPath::new("/store/DCIM", format!("IMG_{:04}.JPG", self.shots)))
    }

    fn download_file(&mut self, source: &CameraPath, destination: &Path) -> Result<(), DeviceError> {
        self.online()?;
        self.script.record(format!("download {}", source.name));
        std::fs::write(destination, source.to_string()).map_err(|e| DeviceError::Storage(e.to_string()))
    }

    fn aperture(&mut self) -> Result<i32, DeviceError> {
        self.online()?;
        Ok(self.aperture)
    }

    fn set_aperture(&mut self, aperture: i32) -> Result<(), DeviceError> {
        self.online()?;
        self.script.record(format!("set_aperture {aperture}"));
        self.aperture = aperture;
        Ok(())
    }

    fn iso(&mut self) -> Result<i32, DeviceError> {
        self.online()?;
        Ok(self.iso)
    }

    fn set_iso(&mut self, iso: i32) -> Result<(), DeviceError> {
        self.online()?;
        self.script.record(format!("set_iso {iso}"));
        self.iso = iso;
        Ok(())
    }

    fn capture_target(&mut self) -> Result<String, DeviceError> {
        self.online()?;
        Ok(self.target.clone())
    }

    fn set_capture_target(&mut self, target: &str) -> Result<(), DeviceError> {
        self.online()?;
        self.target = target.to_string();
        Ok(())
    }
}

/// Camera settings with retry timers short enough for tests.
pub fn fast_settings(download_dir: &Path) -> CameraSettings {
    CameraSettings {
        download_dir: download_dir.to_path_buf(),
        download: false,
        connection_retry: Duration::from_millis(100),
        error_retry: Duration::from_millis(100),
        recovery_grace: Duration::from_millis(10),
    }
}

/// Mailbox subscribed to a set of topics, for asserting on broadcasts.
pub struct Probe {
    inbox: Arc<Mailbox<Message, 512>>,
}

impl Probe {
    pub fn attach(broker: &EventBroker, topics: &[Topic]) -> Self {
        let inbox = Arc::new(Mailbox::new());
        for &topic in topics {
            broker.subscribe(inbox.clone(), topic);
        }
        Self { inbox }
    }

    /// Skip events until one matches, or give up after `timeout`.
    pub fn wait_for(&self, timeout: Duration, mut matches: impl FnMut(&Event) -> bool) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.checked_duration_since(Instant::now())?;
            if let Some(Message::Event(ev)) = self.inbox.pop_timeout(left) {
                let ev: &Event = &ev;
                if matches(ev) {
                    return Some(ev.clone());
                }
            }
        }
    }

    /// Every event received until one matches, the match included.
    pub fn collect_until(&self, timeout: Duration, mut matches: impl FnMut(&Event) -> bool) -> Vec<Event> {
        let mut seen = Vec::new();
        self.wait_for(timeout, |ev| {
            seen.push(ev.clone());
            matches(ev)
        });
        seen
    }
}

pub fn status_name(event: &Event) -> Option<&str> {
    match event {
        Event::CameraControllerState { state, .. } => Some(state),
        _ => None,
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}
