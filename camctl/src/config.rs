//! Daemon configuration (`camctl.toml`).
//!
//! ```toml
//! [shared]
//! service_name = "camctl"
//! log_level = "info"
//!
//! [device]
//! driver = "simulation"
//! download_dir = "/var/lib/camctl/photos"
//! download = false
//!
//! [transport]
//! bind = "0.0.0.0"
//! port = 60099
//!
//! [timing]
//! connection_retry_ms = 2000
//! error_retry_ms = 2000
//! recovery_grace_ms = 500
//! heartbeat_ms = 1000
//! ```
//!
//! Every section and key is optional.

use camctl_common::config::{ConfigError, SharedConfig};
use camctl_common::consts::{DEFAULT_PORT, MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub shared: SharedConfig,
    pub device: DeviceConfig,
    pub transport: TransportConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Registered driver name.
    pub driver: String,
    /// Where captured files are stored when downloading is on.
    pub download_dir: PathBuf,
    /// Initial value of the "download after capture" flag.
    pub download: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            driver: "simulation".to_string(),
            download_dir: PathBuf::from("."),
            download: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Start the remote control server.
    pub enabled: bool,
    pub bind: IpAddr,
    pub port: u16,
    /// Largest accepted frame body in bytes.
    pub max_frame_len: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl TransportConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Backoff and period settings, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub connection_retry_ms: u64,
    pub error_retry_ms: u64,
    /// Pause between disconnect and reconnect during error recovery.
    pub recovery_grace_ms: u64,
    pub heartbeat_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connection_retry_ms: 2000,
            error_retry_ms: 2000,
            recovery_grace_ms: 500,
            heartbeat_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn connection_retry(&self) -> Duration {
        Duration::from_millis(self.connection_retry_ms)
    }

    pub fn error_retry(&self) -> Duration {
        Duration::from_millis(self.error_retry_ms)
    }

    pub fn recovery_grace(&self) -> Duration {
        Duration::from_millis(self.recovery_grace_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

impl ControllerConfig {
    /// # Errors
    ///
    /// `ConfigError::ValidationError` on an empty service name or driver,
    /// port 0 while the transport is enabled, a frame limit outside
    /// `1..=MAX_FRAME_LEN`, or a download directory that does not exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.device.driver.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "device.driver cannot be empty".to_string(),
            ));
        }
        if !self.device.download_dir.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "device.download_dir {} is not a directory",
                self.device.download_dir.display()
            )));
        }
        if self.transport.enabled && self.transport.port == 0 {
            return Err(ConfigError::ValidationError(
                "transport.port must be non-zero".to_string(),
            ));
        }
        if self.transport.max_frame_len == 0 || self.transport.max_frame_len > MAX_FRAME_LEN {
            return Err(ConfigError::ValidationError(format!(
                "transport.max_frame_len must be in 1..={MAX_FRAME_LEN}"
            )));
        }
        if self.timing.heartbeat_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timing.heartbeat_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
