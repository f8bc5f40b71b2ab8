//! Simulated tethered camera.
//!
//! `SimulatedCamera` implements [`Device`] entirely in memory so the
//! controller can run without a body attached. Captures produce
//! incrementing file names on a fake memory card; downloads write a small
//! placeholder file to the requested destination.
//!
//! Exposures of one second or longer go through the same timed sequence a
//! real body needs for host-timed bulb shots: open the shutter, sleep for
//! the exposure, close it, then poll for the "capture complete" and
//! "file added" notifications within an overall budget.

use camctl_common::prelude::*;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

const FOLDER: &str = "/store_00010001/DCIM/100SIM";
const BULB: i32 = -1;
/// Exposures at or above this length run the bulb sequence.
const LONG_EXPOSURE_US: i32 = 1_000_000;
/// Extra time allowed after the shutter closes for the file to show up.
const COMPLETION_BUDGET: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Simulated time the body needs to write the file after the shutter closes.
const WRITE_LATENCY: Duration = Duration::from_millis(60);

const SHUTTER_CHOICES: &[i32] = &[
    BULB, 30_000_000, 15_000_000, 8_000_000, 4_000_000, 2_000_000, 1_000_000, 500_000, 250_000,
    125_000, 66_666, 33_333, 16_666, 8_000, 4_000, 2_000, 1_000, 500, 250,
];
const APERTURE_CHOICES: &[i32] = &[180, 280, 400, 560, 800, 1100, 1600, 2200];
const ISO_CHOICES: &[i32] = &[100, 200, 400, 800, 1600, 3200, 6400, 12800];
const FOCUS_MODES: &[&str] = &["AF-S", "AF-C", "AF-A", "MF"];

#[derive(Debug)]
enum Notification {
    CaptureComplete,
    FileAdded(CameraPath),
}

pub struct SimulatedCamera {
    connected: bool,
    sessions: u32,
    shutter_speed: i32,
    /// Exposure used when the shutter is set to bulb.
    bulb_duration: Duration,
    aperture: i32,
    iso: i32,
    auto_iso: bool,
    long_exp_nr: bool,
    vr: bool,
    focus_mode: usize,
    capture_target: String,
    battery: i32,
    next_file: u32,
    notifications: VecDeque<(Instant, Notification)>,
}

impl SimulatedCamera {
    pub const DRIVER_NAME: &'static str = "simulation";

    pub fn new() -> Self {
        Self {
            connected: false,
            sessions: 0,
            shutter_speed: 8_000,
            bulb_duration: Duration::from_secs(1),
            aperture: 800,
            iso: 100,
            auto_iso: false,
            long_exp_nr: false,
            vr: true,
            focus_mode: 0,
            capture_target: "Internal RAM".to_string(),
            battery: 100,
            next_file: 1,
            notifications: VecDeque::new(),
        }
    }

    /// Factory registered under [`Self::DRIVER_NAME`].
    pub fn factory() -> Box<dyn Device> {
        Box::new(Self::new())
    }

    pub fn set_bulb_duration(&mut self, duration: Duration) {
        self.bulb_duration = duration;
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    /// The choice closest to `value`, the way a body snaps a dial.
    fn nearest(choices: &[i32], value: i32) -> i32 {
        choices
            .iter()
            .copied()
            .min_by_key(|c| (i64::from(*c) - i64::from(value)).abs())
            .unwrap_or(value)
    }

    fn exposure(&self) -> Duration {
        if self.shutter_speed == BULB {
            self.bulb_duration
        } else {
            Duration::from_micros(u64::from(self.shutter_speed.unsigned_abs()))
        }
    }

    fn allocate_file(&mut self) -> CameraPath {
        let path = CameraPath::new(FOLDER, format!("DSC_{:04}.JPG", self.next_file));
        self.next_file = if self.next_file >= 9999 { 1 } else { self.next_file + 1 };
        if self.next_file % 50 == 0 {
            self.battery = (self.battery - 1).max(0);
        }
        path
    }

    fn close_shutter(&mut self) {
        let now = Instant::now();
        let file = self.allocate_file();
        self.notifications
            .push_back((now, Notification::CaptureComplete));
        self.notifications
            .push_back((now + WRITE_LATENCY, Notification::FileAdded(file)));
    }

    /// Next notification that is due within `timeout`, waiting for it if
    /// needed.
    fn wait_notification(&mut self, timeout: Duration) -> Option<Notification> {
        let (ready_at, _) = self.notifications.front()?;
        let wait = ready_at.saturating_duration_since(Instant::now());
        if wait > timeout {
            thread::sleep(timeout);
            return None;
        }
        thread::sleep(wait);
        self.notifications.pop_front().map(|(_, n)| n)
    }

    fn bulb_capture(&mut self) -> Result<CameraPath, DeviceError> {
        let exposure = self.exposure();
        debug!(exposure_ms = exposure.as_millis(), "bulb: shutter open");
        thread::sleep(exposure);
        self.close_shutter();
        debug!("bulb: shutter closed");

        let deadline = Instant::now() + COMPLETION_BUDGET;
        let mut complete = false;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DeviceError::Timeout(format!(
                    "no file after {}s exposure",
                    exposure.as_secs_f32()
                )));
            }
            match self.wait_notification(remaining.min(POLL_INTERVAL)) {
                Some(Notification::CaptureComplete) => {
                    trace!("bulb: capture complete");
                    complete = true;
                }
                Some(Notification::FileAdded(path)) if complete => return Ok(path),
                Some(Notification::FileAdded(path)) => {
                    trace!(file = %path, "bulb: file before completion, waiting");
                    complete = true;
                    self.notifications
                        .push_front((Instant::now(), Notification::FileAdded(path)));
                }
                None => {}
            }
        }
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for SimulatedCamera {
    fn name(&self) -> &'static str {
        Self::DRIVER_NAME
    }

    fn connect(&mut self) -> Result<String, DeviceError> {
        self.connected = true;
        self.sessions += 1;
        self.notifications.clear();
        let id = format!("Simulated Camera v{} (session {})", env!("CARGO_PKG_VERSION"), self.sessions);
        info!(device = %id, "simulated camera connected");
        Ok(id)
    }

    fn disconnect(&mut self) {
        if self.connected {
            info!("simulated camera disconnected");
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn capture(&mut self) -> Result<CameraPath, DeviceError> {
        self.ensure_connected()?;
        if self.shutter_speed == BULB || self.shutter_speed >= LONG_EXPOSURE_US {
            return self.bulb_capture();
        }
        thread::sleep(self.exposure());
        let path = self.allocate_file();
        debug!(file = %path, "simulated capture");
        Ok(path)
    }

    fn download_file(&mut self, source: &CameraPath, destination: &Path) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        let body = format!("simulated image {source}\n");
        fs::write(destination, body)
            .map_err(|e| DeviceError::Storage(format!("{}: {e}", destination.display())))?;
        debug!(file = %source, dest = %destination.display(), "simulated download");
        Ok(())
    }

    fn shutter_speed(&mut self) -> Result<ShutterSpeed, DeviceError> {
        self.ensure_connected()?;
        Ok(ShutterSpeed {
            shutter_speed: self.shutter_speed,
            bulb: self.shutter_speed == BULB,
        })
    }

    fn shutter_speed_choices(&mut self) -> Result<Vec<i32>, DeviceError> {
        self.ensure_connected()?;
        Ok(SHUTTER_CHOICES.to_vec())
    }

    fn set_shutter_speed(&mut self, microseconds: i32) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        let longest = SHUTTER_CHOICES.iter().copied().max().unwrap_or(BULB);
        self.shutter_speed = if microseconds == BULB {
            BULB
        } else if microseconds > longest {
            self.bulb_duration = Duration::from_micros(u64::from(microseconds.unsigned_abs()));
            BULB
        } else {
            let timed: Vec<i32> = SHUTTER_CHOICES.iter().copied().filter(|c| *c != BULB).collect();
            Self::nearest(&timed, microseconds)
        };
        Ok(())
    }

    fn aperture(&mut self) -> Result<i32, DeviceError> {
        self.ensure_connected()?;
        Ok(self.aperture)
    }

    fn aperture_choices(&mut self) -> Result<Vec<i32>, DeviceError> {
        self.ensure_connected()?;
        Ok(APERTURE_CHOICES.to_vec())
    }

    fn set_aperture(&mut self, aperture: i32) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.aperture = Self::nearest(APERTURE_CHOICES, aperture);
        Ok(())
    }

    fn iso(&mut self) -> Result<i32, DeviceError> {
        self.ensure_connected()?;
        Ok(self.iso)
    }

    fn iso_choices(&mut self) -> Result<Vec<i32>, DeviceError> {
        self.ensure_connected()?;
        Ok(ISO_CHOICES.to_vec())
    }

    fn set_iso(&mut self, iso: i32) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.iso = Self::nearest(ISO_CHOICES, iso);
        Ok(())
    }

    fn auto_iso(&mut self) -> Result<bool, DeviceError> {
        self.ensure_connected()?;
        Ok(self.auto_iso)
    }

    fn set_auto_iso(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.auto_iso = enabled;
        Ok(())
    }

    fn exposure_program(&mut self) -> Result<String, DeviceError> {
        self.ensure_connected()?;
        Ok("M".to_string())
    }

    fn light_meter(&mut self) -> Result<LightMeter, DeviceError> {
        self.ensure_connected()?;
        // Metered against a fixed EV 12 scene.
        let ev = ((self.aperture as f32 / 100.0).powi(2) * 1_000_000.0
            / self.shutter_speed.max(1) as f32)
            .log2()
            - (self.iso as f32 / 100.0).log2();
        Ok(LightMeter {
            value: (ev - 12.0).clamp(-3.0, 3.0),
            min: -3.0,
            max: 3.0,
        })
    }

    fn battery_percent(&mut self) -> Result<i32, DeviceError> {
        self.ensure_connected()?;
        Ok(self.battery)
    }

    fn focal_length(&mut self) -> Result<i32, DeviceError> {
        self.ensure_connected()?;
        Ok(50)
    }

    fn focus_mode(&mut self) -> Result<String, DeviceError> {
        self.ensure_connected()?;
        Ok(FOCUS_MODES[self.focus_mode].to_string())
    }

    fn next_focus_mode(&mut self) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.focus_mode = (self.focus_mode + 1) % FOCUS_MODES.len();
        Ok(())
    }

    fn long_exposure_nr(&mut self) -> Result<bool, DeviceError> {
        self.ensure_connected()?;
        Ok(self.long_exp_nr)
    }

    fn set_long_exposure_nr(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.long_exp_nr = enabled;
        Ok(())
    }

    fn vibration_reduction(&mut self) -> Result<bool, DeviceError> {
        self.ensure_connected()?;
        Ok(self.vr)
    }

    fn set_vibration_reduction(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.vr = enabled;
        Ok(())
    }

    fn capture_target(&mut self) -> Result<String, DeviceError> {
        self.ensure_connected()?;
        Ok(self.capture_target.clone())
    }

    fn set_capture_target(&mut self, target: &str) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        match target {
            "Internal RAM" | "Memory card" => {
                self.capture_target = target.to_string();
                Ok(())
            }
            other => Err(DeviceError::InvalidValue {
                setting: "capture_target",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> SimulatedCamera {
        let mut cam = SimulatedCamera::new();
        cam.connect().unwrap();
        cam
    }

    #[test]
    fn accessors_require_connection() {
        let mut cam = SimulatedCamera::new();
        assert_eq!(cam.iso(), Err(DeviceError::NotConnected));
        assert_eq!(cam.capture(), Err(DeviceError::NotConnected));
        cam.connect().unwrap();
        assert_eq!(cam.iso(), Ok(100));
        cam.disconnect();
        assert!(!cam.is_connected());
    }

    #[test]
    fn captures_get_incrementing_names() {
        let mut cam = connected();
        let first = cam.capture().unwrap();
        let second = cam.capture().unwrap();
        assert_eq!(first.to_string(), "/store_00010001/DCIM/100SIM/DSC_0001.JPG");
        assert_eq!(second.name, "DSC_0002.JPG");
    }

    #[test]
    fn setters_snap_to_nearest_choice() {
        let mut cam = connected();
        assert!(cam.set_aperture(800).is_ok());
        assert_eq!(cam.aperture(), Ok(800));
        assert!(cam.set_aperture(123).is_ok());
        assert_eq!(cam.aperture(), Ok(180));
        assert!(cam.set_iso(3000).is_ok());
        assert_eq!(cam.iso(), Ok(3200));
        cam.set_shutter_speed(7_000).unwrap();
        assert_eq!(cam.shutter_speed().map(|s| s.shutter_speed), Ok(8_000));
        cam.set_shutter_speed(60_000_000).unwrap();
        assert_eq!(
            cam.shutter_speed(),
            Ok(ShutterSpeed { shutter_speed: BULB, bulb: true })
        );
        assert_eq!(cam.exposure(), Duration::from_secs(60));
        assert!(cam.set_capture_target("Memory card").is_ok());
        assert!(cam.set_capture_target("Cloud").is_err());
    }

    #[test]
    fn focus_mode_cycles() {
        let mut cam = connected();
        let modes: Vec<String> = (0..5)
            .map(|_| {
                let mode = cam.focus_mode().unwrap();
                cam.next_focus_mode().unwrap();
                mode
            })
            .collect();
        assert_eq!(modes, ["AF-S", "AF-C", "AF-A", "MF", "AF-S"]);
    }

    #[test]
    fn bulb_capture_waits_for_file() {
        let mut cam = connected();
        cam.set_shutter_speed(BULB).unwrap();
        cam.set_bulb_duration(Duration::from_millis(100));
        assert!(cam.shutter_speed().unwrap().bulb);

        let start = Instant::now();
        let path = cam.capture().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100) + WRITE_LATENCY);
        assert_eq!(path.name, "DSC_0001.JPG");
    }

    #[test]
    fn download_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let mut cam = connected();
        let src = cam.capture().unwrap();
        let dest = dir.path().join(&src.name);
        cam.download_file(&src, &dest).unwrap();
        assert!(dest.is_file());

        let missing = dir.path().join("nope").join("x.jpg");
        assert!(matches!(cam.download_file(&src, &missing), Err(DeviceError::Storage(_))));
    }
}
