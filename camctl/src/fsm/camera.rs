//! Camera controller state machine.
//!
//! ```text
//! Super
//! ├── Disconnected            (initial)
//! ├── Connected
//! │   └── Ready
//! │       ├── Capturing
//! │       └── Downloading
//! ├── ConnectionError
//! └── Error
//! ```
//!
//! The controller owns the [`Device`] and is the only actor that calls it.
//! Every device call happens inside a handler; a failure is logged and
//! turned into a transition, never propagated out of the machine.
//!
//! Configuration values are broadcast on [`Topic::CameraConfig`], lifecycle
//! notifications and the controller status on [`Topic::CameraEvent`].

use crate::config::ControllerConfig;
use camctl_common::device::{CameraPath, Device, DeviceError};
use camctl_common::events::{Event, EventPtr, Topic};
use camctl_runtime::broker::DelayedId;
use camctl_runtime::hsm::{Context, Signal, StateMachine, StateResult};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Topics the camera controller actor subscribes to.
pub const TOPICS: &[Topic] = &[Topic::CameraCmd];

const CAPTURE_TARGET: &str = "Memory card";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Super,
    Disconnected,
    Connected,
    Ready,
    Capturing,
    Downloading,
    ConnectionError,
    Error,
}

impl CameraState {
    /// Name reported in `CameraControllerState`.
    pub fn name(self) -> &'static str {
        match self {
            CameraState::Super => "super",
            CameraState::Disconnected => "disconnected",
            CameraState::Connected => "connected",
            CameraState::Ready => "ready",
            CameraState::Capturing => "capturing",
            CameraState::Downloading => "downloading",
            CameraState::ConnectionError => "connection_error",
            CameraState::Error => "error",
        }
    }
}

/// Static controller settings.
#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub download_dir: PathBuf,
    /// Initial value of the download flag.
    pub download: bool,
    pub connection_retry: Duration,
    pub error_retry: Duration,
    pub recovery_grace: Duration,
}

impl CameraSettings {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            download_dir: config.device.download_dir.clone(),
            download: config.device.download,
            connection_retry: config.timing.connection_retry(),
            error_retry: config.timing.error_retry(),
            recovery_grace: config.timing.recovery_grace(),
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self::from_config(&ControllerConfig::default())
    }
}

/// Device errors that do not mean the camera is in trouble: the setting
/// is missing on this body or the requested value is not offered. Only
/// the refresh and the capture target on connect tolerate them.
fn is_fault(err: &DeviceError) -> bool {
    !matches!(
        err,
        DeviceError::Unsupported(_) | DeviceError::InvalidValue { .. }
    )
}

/// Everything broadcast by a full configuration refresh.
const REFRESH: &[Event] = &[
    Event::ConfigGetShutterSpeed,
    Event::ConfigGetChoicesShutterSpeed,
    Event::ConfigGetAperture,
    Event::ConfigGetChoicesAperture,
    Event::ConfigGetIso,
    Event::ConfigGetChoicesIso,
    Event::ConfigGetAutoIso,
    Event::ConfigGetBattery,
    Event::ConfigGetFocalLength,
    Event::ConfigGetFocusMode,
    Event::ConfigGetLongExpNr,
    Event::ConfigGetVibRed,
    Event::ConfigGetCaptureTarget,
    Event::ConfigGetExposureProgram,
    Event::ConfigGetLightMeter,
];

pub struct CameraController {
    device: Box<dyn Device>,
    settings: CameraSettings,
    download: bool,
    low_latency: bool,
    connected: bool,
    /// Last leaf entered, reported in status events.
    status: CameraState,
    last_capture: Option<CameraPath>,
    retry_timer: Option<DelayedId>,
    recovery_timer: Option<DelayedId>,
}

impl CameraController {
    pub fn new(device: Box<dyn Device>, settings: CameraSettings) -> Self {
        Self {
            download: settings.download,
            device,
            settings,
            low_latency: false,
            connected: false,
            status: CameraState::Disconnected,
            last_capture: None,
            retry_timer: None,
            recovery_timer: None,
        }
    }

    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    fn status_event(&self) -> Event {
        Event::CameraControllerState {
            state: self.status.name().to_string(),
            camera_connected: self.connected,
            download: self.download,
        }
    }

    /// Record a new leaf and broadcast the status.
    fn enter_leaf(&mut self, state: CameraState, ctx: &Context<'_>) {
        self.status = state;
        ctx.post(self.status_event(), Topic::CameraEvent);
    }

    fn connect(&mut self) -> Result<(), DeviceError> {
        let id = self.device.connect()?;
        info!(device = %id, "camera connected");
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.device.disconnect();
        self.connected = false;
    }

    // ─── Configuration ──────────────────────────────────────────────

    /// Serve one get or set request against the device and broadcast the
    /// resulting value. Setters re-read the value after writing it.
    fn apply_config(&mut self, event: &Event, ctx: &Context<'_>) -> Result<(), DeviceError> {
        let dev = &mut self.device;
        let reply = match event {
            Event::ConfigGetShutterSpeed => {
                let s = dev.shutter_speed()?;
                Event::ConfigValueShutterSpeed {
                    shutter_speed: s.shutter_speed,
                    bulb: s.bulb,
                }
            }
            Event::ConfigGetChoicesShutterSpeed => Event::ConfigChoicesShutterSpeed {
                shutter_speed_choices: dev.shutter_speed_choices()?,
            },
            Event::ConfigSetShutterSpeed { shutter_speed } => {
                dev.set_shutter_speed(*shutter_speed)?;
                return self.apply_config(&Event::ConfigGetShutterSpeed, ctx);
            }
            Event::ConfigGetAperture => Event::ConfigValueAperture {
                aperture: dev.aperture()?,
            },
            Event::ConfigGetChoicesAperture => Event::ConfigChoicesAperture {
                aperture_choices: dev.aperture_choices()?,
            },
            Event::ConfigSetAperture { aperture } => {
                dev.set_aperture(*aperture)?;
                return self.apply_config(&Event::ConfigGetAperture, ctx);
            }
            Event::ConfigGetIso => Event::ConfigValueIso { iso: dev.iso()? },
            Event::ConfigGetChoicesIso => Event::ConfigChoicesIso {
                iso_choices: dev.iso_choices()?,
            },
            Event::ConfigSetIso { iso } => {
                dev.set_iso(*iso)?;
                return self.apply_config(&Event::ConfigGetIso, ctx);
            }
            Event::ConfigGetAutoIso => Event::ConfigValueAutoIso {
                auto_iso: dev.auto_iso()?,
            },
            Event::ConfigSetAutoIso { auto_iso } => {
                dev.set_auto_iso(*auto_iso)?;
                return self.apply_config(&Event::ConfigGetAutoIso, ctx);
            }
            Event::ConfigGetBattery => Event::ConfigValueBattery {
                battery: dev.battery_percent()?,
            },
            Event::ConfigGetFocalLength => Event::ConfigValueFocalLength {
                focal_length: dev.focal_length()?,
            },
            Event::ConfigGetFocusMode => Event::ConfigValueFocusMode {
                focus_mode: dev.focus_mode()?,
            },
            Event::ConfigNextFocusMode => {
                dev.next_focus_mode()?;
                return self.apply_config(&Event::ConfigGetFocusMode, ctx);
            }
            Event::ConfigGetLongExpNr => Event::ConfigValueLongExpNr {
                long_exp_nr: dev.long_exposure_nr()?,
            },
            Event::ConfigSetLongExpNr { long_exp_nr } => {
                dev.set_long_exposure_nr(*long_exp_nr)?;
                return self.apply_config(&Event::ConfigGetLongExpNr, ctx);
            }
            Event::ConfigGetVibRed => Event::ConfigValueVibRed {
                vr: dev.vibration_reduction()?,
            },
            Event::ConfigSetVibRed { vr } => {
                dev.set_vibration_reduction(*vr)?;
                return self.apply_config(&Event::ConfigGetVibRed, ctx);
            }
            Event::ConfigGetCaptureTarget => Event::ConfigValueCaptureTarget {
                target: dev.capture_target()?,
            },
            Event::ConfigSetCaptureTarget { target } => {
                dev.set_capture_target(target)?;
                return self.apply_config(&Event::ConfigGetCaptureTarget, ctx);
            }
            Event::ConfigGetExposureProgram => Event::ConfigValueExposureProgram {
                exposure_program: dev.exposure_program()?,
            },
            Event::ConfigGetLightMeter => {
                let m = dev.light_meter()?;
                Event::ConfigValueLightMeter {
                    light_meter: m.value,
                    min: m.min,
                    max: m.max,
                }
            }
            Event::ConfigGetAll => return self.refresh_all(ctx),
            other => {
                debug!(event = %other, "not a configuration request");
                return Ok(());
            }
        };
        ctx.post(reply, Topic::CameraConfig);
        Ok(())
    }

    /// Broadcast every value and choice list the device offers.
    fn refresh_all(&mut self, ctx: &Context<'_>) -> Result<(), DeviceError> {
        for request in REFRESH {
            match self.apply_config(request, ctx) {
                Ok(()) => {}
                Err(e) if !is_fault(&e) => debug!(request = %request, "skipped: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn config_request(&mut self, event: &Event, ctx: &Context<'_>) -> StateResult<CameraState> {
        match self.apply_config(event, ctx) {
            Ok(()) => StateResult::Handled,
            Err(e) => {
                error!(event = %event, "configuration request failed: {e}");
                StateResult::TransitionTo(CameraState::Error)
            }
        }
    }

    // ─── State handlers ─────────────────────────────────────────────

    fn state_super(&mut self, signal: &Signal, ctx: &mut Context<'_>) -> StateResult<CameraState> {
        match signal {
            Signal::Init => StateResult::TransitionTo(CameraState::Disconnected),
            Signal::Entry | Signal::Exit => StateResult::Handled,
            Signal::Event(ev) => match &**ev {
                Event::CameraCmdDownload { download } => {
                    self.download = *download;
                    info!(download, "download after capture");
                    ctx.post(self.status_event(), Topic::CameraEvent);
                    StateResult::Handled
                }
                Event::CameraCmdLowLatency { low_latency } => {
                    self.low_latency = *low_latency;
                    info!(low_latency, "low latency mode");
                    StateResult::Handled
                }
                Event::GetCameraControllerState => {
                    ctx.post(self.status_event(), Topic::CameraEvent);
                    StateResult::Handled
                }
                _ => StateResult::Delegate,
            },
        }
    }

    fn state_disconnected(
        &mut self,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<CameraState> {
        match signal {
            Signal::Entry => {
                self.enter_leaf(CameraState::Disconnected, ctx);
                ctx.post(Event::CameraDisconnected, Topic::CameraEvent);
                StateResult::Handled
            }
            Signal::Event(ev) if **ev == Event::CameraCmdConnect => match self.connect() {
                Ok(()) => StateResult::TransitionTo(CameraState::Connected),
                Err(e) => {
                    warn!("connection failed: {e}");
                    StateResult::TransitionTo(CameraState::ConnectionError)
                }
            },
            _ => StateResult::Delegate,
        }
    }

    fn state_connection_error(
        &mut self,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<CameraState> {
        match signal {
            Signal::Entry => {
                self.enter_leaf(CameraState::ConnectionError, ctx);
                ctx.post(Event::CameraConnectionError, Topic::CameraEvent);
                self.retry_timer = Some(ctx.post_delayed(
                    Event::CameraCmdConnect,
                    Topic::CameraCmd,
                    self.settings.connection_retry,
                ));
                StateResult::Handled
            }
            Signal::Exit => {
                if let Some(id) = self.retry_timer.take() {
                    ctx.remove_delayed(id);
                }
                StateResult::Handled
            }
            Signal::Event(ev) => match &**ev {
                Event::CameraCmdConnect => match self.connect() {
                    Ok(()) => StateResult::TransitionTo(CameraState::Connected),
                    Err(e) => {
                        warn!(retry_ms = self.settings.connection_retry.as_millis(), "connection failed: {e}");
                        StateResult::TransitionTo(CameraState::ConnectionError)
                    }
                },
                Event::CameraCmdDisconnect => StateResult::TransitionTo(CameraState::Disconnected),
                e if e.is_config_setter() => {
                    ctx.defer(ev);
                    StateResult::Handled
                }
                _ => StateResult::Delegate,
            },
            Signal::Init => StateResult::Handled,
        }
    }

    fn state_connected(
        &mut self,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<CameraState> {
        match signal {
            Signal::Entry => {
                ctx.post(Event::CameraConnected, Topic::CameraEvent);
                if let Err(e) = self.device.set_capture_target(CAPTURE_TARGET) {
                    if is_fault(&e) {
                        error!("cannot set capture target: {e}");
                        ctx.post_self(Event::CameraError);
                    } else {
                        warn!("capture target left unchanged: {e}");
                    }
                }
                StateResult::Handled
            }
            Signal::Init => StateResult::TransitionTo(CameraState::Ready),
            Signal::Exit => StateResult::Handled,
            Signal::Event(ev) => match &**ev {
                Event::CameraCmdDisconnect => {
                    self.disconnect();
                    StateResult::TransitionTo(CameraState::Disconnected)
                }
                Event::CameraError => StateResult::TransitionTo(CameraState::Error),
                _ => StateResult::Delegate,
            },
        }
    }

    fn state_ready(&mut self, signal: &Signal, ctx: &mut Context<'_>) -> StateResult<CameraState> {
        match signal {
            Signal::Entry => {
                self.enter_leaf(CameraState::Ready, ctx);
                ctx.post(Event::CameraReady, Topic::CameraEvent);
                if !self.low_latency {
                    if let Err(e) = self.refresh_all(ctx) {
                        error!("configuration refresh failed: {e}");
                        ctx.post_self(Event::CameraError);
                    }
                }
                ctx.process_deferred();
                StateResult::Handled
            }
            Signal::Event(ev) => match &**ev {
                Event::CameraCmdCapture => StateResult::TransitionTo(CameraState::Capturing),
                e if e.is_config_request() => self.config_request(e, ctx),
                _ => StateResult::Delegate,
            },
            Signal::Init | Signal::Exit => StateResult::Handled,
        }
    }

    /// Shared by the busy states: hold back anything that must not run
    /// while the device is in use.
    fn defer_while_busy(ev: &EventPtr, ctx: &mut Context<'_>) -> Option<StateResult<CameraState>> {
        if **ev == Event::CameraCmdCapture || ev.is_config_request() {
            ctx.defer(ev);
            Some(StateResult::Handled)
        } else {
            None
        }
    }

    fn state_capturing(
        &mut self,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<CameraState> {
        match signal {
            Signal::Entry => {
                self.enter_leaf(CameraState::Capturing, ctx);
                ctx.post_self(Event::CameraCmdCaptureInternal);
                StateResult::Handled
            }
            Signal::Event(ev) if **ev == Event::CameraCmdCaptureInternal => {
                match self.device.capture() {
                    Ok(path) => {
                        info!(file = %path, "captured");
                        if self.download {
                            self.last_capture = Some(path);
                            StateResult::TransitionTo(CameraState::Downloading)
                        } else {
                            ctx.post(
                                Event::CameraCaptureDone {
                                    downloaded: false,
                                    file: String::new(),
                                },
                                Topic::CameraEvent,
                            );
                            StateResult::TransitionTo(CameraState::Ready)
                        }
                    }
                    Err(e) => {
                        error!("capture failed: {e}");
                        StateResult::TransitionTo(CameraState::Error)
                    }
                }
            }
            Signal::Event(ev) => {
                Self::defer_while_busy(ev, ctx).unwrap_or(StateResult::Delegate)
            }
            Signal::Init | Signal::Exit => StateResult::Handled,
        }
    }

    fn state_downloading(
        &mut self,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<CameraState> {
        match signal {
            Signal::Entry => {
                self.enter_leaf(CameraState::Downloading, ctx);
                ctx.post_self(Event::CameraCmdDownloadInternal);
                StateResult::Handled
            }
            Signal::Event(ev) if **ev == Event::CameraCmdDownloadInternal => {
                let Some(source) = self.last_capture.take() else {
                    warn!("nothing to download");
                    return StateResult::TransitionTo(CameraState::Ready);
                };
                let destination = self.settings.download_dir.join(&source.name);
                match self.device.download_file(&source, &destination) {
                    Ok(()) => {
                        info!(file = %destination.display(), "downloaded");
                        ctx.post(
                            Event::CameraCaptureDone {
                                downloaded: true,
                                file: destination.display().to_string(),
                            },
                            Topic::CameraEvent,
                        );
                        StateResult::TransitionTo(CameraState::Ready)
                    }
                    Err(e) => {
                        error!(file = %source, "download failed: {e}");
                        StateResult::TransitionTo(CameraState::Error)
                    }
                }
            }
            Signal::Event(ev) => {
                Self::defer_while_busy(ev, ctx).unwrap_or(StateResult::Delegate)
            }
            Signal::Init | Signal::Exit => StateResult::Handled,
        }
    }

    fn state_error(&mut self, signal: &Signal, ctx: &mut Context<'_>) -> StateResult<CameraState> {
        match signal {
            Signal::Entry => {
                self.enter_leaf(CameraState::Error, ctx);
                ctx.post(Event::CameraError, Topic::CameraEvent);
                self.recovery_timer = Some(ctx.post_delayed(
                    Event::CameraCmdRecoverError,
                    Topic::CameraCmd,
                    self.settings.error_retry,
                ));
                StateResult::Handled
            }
            Signal::Exit => {
                if let Some(id) = self.recovery_timer.take() {
                    ctx.remove_delayed(id);
                }
                StateResult::Handled
            }
            Signal::Event(ev) => match &**ev {
                Event::CameraCmdRecoverError | Event::CameraCmdConnect => {
                    info!("attempting recovery");
                    self.disconnect();
                    thread::sleep(self.settings.recovery_grace);
                    match self.connect() {
                        Ok(()) => StateResult::TransitionTo(CameraState::Connected),
                        Err(e) => {
                            warn!("recovery failed: {e}");
                            StateResult::TransitionTo(CameraState::Error)
                        }
                    }
                }
                Event::CameraIgnoreError => {
                    info!("error ignored");
                    StateResult::TransitionTo(CameraState::Connected)
                }
                Event::CameraCmdDisconnect => {
                    self.disconnect();
                    StateResult::TransitionTo(CameraState::Disconnected)
                }
                Event::CameraError => StateResult::Handled,
                e if e.is_config_setter() => {
                    ctx.defer(ev);
                    StateResult::Handled
                }
                _ => StateResult::Delegate,
            },
            Signal::Init => StateResult::Handled,
        }
    }
}

impl StateMachine for CameraController {
    type State = CameraState;

    fn name(&self) -> &'static str {
        "camera"
    }

    fn initial_state(&self) -> CameraState {
        CameraState::Super
    }

    fn parent(&self, state: CameraState) -> Option<CameraState> {
        match state {
            CameraState::Super => None,
            CameraState::Disconnected
            | CameraState::Connected
            | CameraState::ConnectionError
            | CameraState::Error => Some(CameraState::Super),
            CameraState::Ready => Some(CameraState::Connected),
            CameraState::Capturing | CameraState::Downloading => Some(CameraState::Ready),
        }
    }

    fn handle(
        &mut self,
        state: CameraState,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<CameraState> {
        match state {
            CameraState::Super => self.state_super(signal, ctx),
            CameraState::Disconnected => self.state_disconnected(signal, ctx),
            CameraState::Connected => self.state_connected(signal, ctx),
            CameraState::Ready => self.state_ready(signal, ctx),
            CameraState::Capturing => self.state_capturing(signal, ctx),
            CameraState::Downloading => self.state_downloading(signal, ctx),
            CameraState::ConnectionError => self.state_connection_error(signal, ctx),
            CameraState::Error => self.state_error(signal, ctx),
        }
    }
}
