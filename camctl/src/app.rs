//! Application wiring.
//!
//! `Controller` owns the broker and every actor. It follows the usual
//! `new` / `start` / `run` / `shutdown` lifecycle; the binary only adds the
//! signal handler and the optional console on top.

use crate::config::ControllerConfig;
use crate::device_registry::{DeviceRegistry, RegistryError};
use crate::fsm::camera::{self, CameraController, CameraSettings, CameraState};
use crate::fsm::intervalometer::{self, Intervalometer, IntervalometerState};
use crate::fsm::mode::{self, ModeController, ModeState};
use crate::fsm::pass_through::{self, PassThrough};
use crate::sniffer::EventSniffer;
use crate::transport::{CommManager, TransportError};
use camctl_common::config::ConfigError;
use camctl_common::device::Device;
use camctl_common::events::{Event, Topic};
use camctl_runtime::broker::EventBroker;
use camctl_runtime::error::RuntimeError;
use camctl_runtime::hsm_actor::StateMachineActor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub struct Controller {
    broker: Arc<EventBroker>,
    _sniffer: EventSniffer,
    camera: StateMachineActor<CameraController>,
    mode: StateMachineActor<ModeController>,
    intervalometer: StateMachineActor<Intervalometer>,
    pass_through: StateMachineActor<PassThrough>,
    comm: Option<CommManager>,
    running: Arc<AtomicBool>,
}

impl Controller {
    /// Build the controller with the device named in `config.device.driver`.
    pub fn new(config: &ControllerConfig, registry: &DeviceRegistry) -> Result<Self, AppError> {
        let device = registry.create(&config.device.driver)?;
        Self::with_device(config, device)
    }

    pub fn with_device(config: &ControllerConfig, device: Box<dyn Device>) -> Result<Self, AppError> {
        config.validate()?;
        info!(
            service = %config.shared.service_name,
            driver = device.name(),
            download_dir = %config.device.download_dir.display(),
            "building controller"
        );

        let broker = Arc::new(EventBroker::new());
        let sniffer = EventSniffer::attach(Arc::clone(&broker));

        let camera = StateMachineActor::new(
            CameraController::new(device, CameraSettings::from_config(config)),
            Arc::clone(&broker),
            camera::TOPICS,
        );
        let mode = StateMachineActor::new(
            ModeController::new(config.timing.heartbeat()),
            Arc::clone(&broker),
            mode::TOPICS,
        );
        let intervalometer = StateMachineActor::new(
            Intervalometer::new(),
            Arc::clone(&broker),
            intervalometer::TOPICS,
        );
        let pass_through = StateMachineActor::new(
            PassThrough::new(),
            Arc::clone(&broker),
            pass_through::TOPICS,
        );

        let comm = if config.transport.enabled {
            Some(CommManager::new(&config.transport, Arc::clone(&broker))?)
        } else {
            info!("remote transport disabled");
            None
        };

        Ok(Self {
            broker,
            _sniffer: sniffer,
            camera,
            mode,
            intervalometer,
            pass_through,
            comm,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start the broker, every actor and the transport, then ask the camera
    /// to connect.
    pub fn start(&mut self) -> Result<(), AppError> {
        self.broker.start()?;
        self.pass_through.start()?;
        self.camera.start()?;
        self.mode.start()?;
        self.intervalometer.start()?;
        if let Some(comm) = self.comm.as_mut() {
            comm.start()?;
            info!(addr = %comm.local_addr(), "remote control enabled");
        }
        self.running.store(true, Ordering::SeqCst);
        self.broker.post(Event::CameraCmdConnect, Topic::CameraCmd);
        info!("controller started");
        Ok(())
    }

    /// Block until the running flag is cleared.
    pub fn run(&self) {
        while self.running.load(Ordering::SeqCst) {
            thread::sleep(IDLE_POLL);
        }
    }

    /// Stop everything in reverse start order. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        info!("shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        if let Some(comm) = self.comm.as_mut() {
            comm.stop();
        }
        self.intervalometer.stop();
        self.mode.stop();
        self.camera.stop();
        self.pass_through.stop();
        self.broker.stop();
        self.broker.clear_delayed();
    }

    /// Shared flag for signal handlers and the console.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn broker(&self) -> Arc<EventBroker> {
        Arc::clone(&self.broker)
    }

    /// Bound address of the remote server, if enabled.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.comm.as_ref().map(CommManager::local_addr)
    }

    pub fn camera_state(&self) -> CameraState {
        self.camera.current_state()
    }

    pub fn mode_state(&self) -> ModeState {
        self.mode.current_state()
    }

    pub fn intervalometer_state(&self) -> IntervalometerState {
        self.intervalometer.current_state()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            self.shutdown();
        }
    }
}
