//! Controller bound to a device whose connectivity follows the lifecycle

use std::sync::Arc;

use hydro_core::{Connectivity, Device};
use tracing::{error, info, warn};

use crate::controller::Controller;
use crate::error::{EngineError, EngineResult};

/// A [`Controller`] that marks its device connected while it runs
#[derive(Debug)]
pub struct DeviceController {
    controller: Controller,
    device: Arc<dyn Device>,
}

impl DeviceController {
    pub fn new(controller: Controller, device: Arc<dyn Device>) -> Self {
        Self { controller, device }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    /// Mark the device connected, then start the controller
    ///
    /// If the controller fails to start the device goes back to disconnected.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.controller.is_running() {
            return Err(EngineError::AlreadyRunning(self.controller.name().to_string()));
        }

        self.device.set_connectivity(Connectivity::Connected);
        if let Err(e) = self.controller.start() {
            warn!(device = %self.device.name(), error = %e, "Controller failed to start");
            self.device.set_connectivity(Connectivity::Disconnected);
            return Err(e);
        }
        info!(device = %self.device.name(), controller = %self.controller.name(), "Device controller started");
        Ok(())
    }

    /// Stop the controller, then mark the device disconnected
    ///
    /// The device is disconnected even when stopping reports an error.
    pub fn stop(&mut self) -> EngineResult<()> {
        let result = self.controller.stop();
        if !matches!(result, Err(EngineError::NotRunning(_))) {
            self.device.set_connectivity(Connectivity::Disconnected);
        }
        result
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        if self.controller.is_running() {
            warn!(device = %self.device.name(), "Device controller dropped while running, stopping");
            if let Err(e) = self.stop() {
                error!(device = %self.device.name(), error = %e, "Error stopping device controller on drop");
            }
        }
    }
}
