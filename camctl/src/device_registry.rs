//! Device driver registry.
//!
//! Maps driver names from configuration to [`DeviceFactory`] functions.
//! Constructed at startup and passed by reference; there is no global
//! registry.

use crate::devices::simulation::SimulatedCamera;
use camctl_common::device::{Device, DeviceFactory};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Device driver not found: {0}")]
    DriverNotFound(String),
}

pub struct DeviceRegistry {
    factories: HashMap<&'static str, DeviceFactory>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every driver compiled into this binary.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SimulatedCamera::DRIVER_NAME, SimulatedCamera::factory);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DeviceFactory) {
        if self.factories.contains_key(name) {
            panic!("Device driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    pub fn get_factory(&self, name: &str) -> Option<DeviceFactory> {
        self.factories.get(name).copied()
    }

    /// # Errors
    /// `RegistryError::DriverNotFound` if `name` is not registered.
    pub fn create(&self, name: &str) -> Result<Box<dyn Device>, RegistryError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| RegistryError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// Registered driver names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
