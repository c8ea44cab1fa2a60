//! Assembling a running system from a configuration

use std::sync::Arc;

use anyhow::{Context, Result};
use hydro_config::ControllerConfig;
use hydro_core::{Clock, Connectivity, Device, ItemRegistry, ItemStatus, SimulatedBoard};
use hydro_engine::{
    Controller, ControllerSettings, DeviceController, DispatchStats, EngineResult, TriggerGroup,
};
use tracing::info;

/// Controller with or without a bound device
#[derive(Debug)]
enum Runner {
    Plain(Controller),
    Device(DeviceController),
}

/// Items plus the controller driving them
#[derive(Debug)]
pub struct Hydro {
    items: ItemRegistry,
    runner: Runner,
}

impl Hydro {
    /// Build items, triggers and groups; nothing runs until [`Hydro::start`]
    pub fn from_config(config: &ControllerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let items = config.build_items()?;

        let mut controller = Controller::new(
            config.name.clone(),
            ControllerSettings {
                poll_interval: config.poll_interval,
                default_window: config.default_window,
            },
        );
        if let Some(id) = &config.status_item {
            let item = items
                .require(id)
                .with_context(|| format!("status item {id}"))?;
            controller = controller.with_status(Arc::new(ItemStatus(item)));
        }

        for trigger in &config.triggers {
            controller.add_trigger(trigger.build(&items, &clock, config.default_window)?);
        }
        for group in &config.groups {
            let mut built = TriggerGroup::new(group.name.clone());
            for trigger in &group.triggers {
                built = built.with_trigger(trigger.build(&items, &clock, config.default_window)?);
            }
            controller
                .add_group(Arc::new(built))
                .with_context(|| format!("group {}", group.name))?;
        }

        info!(
            controller = %config.name,
            items = items.len(),
            triggers = config.triggers.len(),
            groups = config.groups.len(),
            "System assembled"
        );

        let runner = match &config.device {
            Some(name) => Runner::Device(DeviceController::new(
                controller,
                Arc::new(SimulatedBoard::new(name.clone())),
            )),
            None => Runner::Plain(controller),
        };
        Ok(Self { items, runner })
    }

    pub fn items(&self) -> &ItemRegistry {
        &self.items
    }

    pub fn controller(&self) -> &Controller {
        match &self.runner {
            Runner::Plain(controller) => controller,
            Runner::Device(dc) => dc.controller(),
        }
    }

    pub fn connectivity(&self) -> Option<Connectivity> {
        match &self.runner {
            Runner::Plain(_) => None,
            Runner::Device(dc) => Some(dc.device().connectivity()),
        }
    }

    pub fn start(&mut self) -> EngineResult<()> {
        match &mut self.runner {
            Runner::Plain(controller) => controller.start(),
            Runner::Device(dc) => dc.start(),
        }
    }

    pub fn stop(&mut self) -> EngineResult<()> {
        match &mut self.runner {
            Runner::Plain(controller) => controller.stop(),
            Runner::Device(dc) => dc.stop(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.controller().is_healthy()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.controller().dispatch_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydro_config::parse_config;
    use hydro_core::{Item, ManualClock};
    use std::time::Duration;

    const CONFIG: &str = r#"
name: bench
poll_interval: 0.001
status_item: sensor.level_1
device: arduino
items:
  - {id: zone.bed_1, state: FLOOD}
  - {id: sensor.level_1, state: HIGH}
  - {id: light.grow_1, state: "OFF"}
triggers:
  - trigger: set
    item: light.grow_1
    state: "ON"
groups:
  - name: bed_1
    triggers:
      - trigger: overflow
        zone: zone.bed_1
        sensor: sensor.level_1
"#;

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        for _ in 0..5000 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_assemble_and_run() {
        let config = parse_config(CONFIG).unwrap();
        let mut hydro = Hydro::from_config(&config, Arc::new(ManualClock::new())).unwrap();
        assert_eq!(hydro.connectivity(), Some(Connectivity::Disconnected));
        assert!(hydro.controller().group("bed_1").is_some());

        hydro.start().unwrap();
        assert_eq!(hydro.connectivity(), Some(Connectivity::Connected));

        let zone = hydro.items().require("zone.bed_1").unwrap();
        let light = hydro.items().require("light.grow_1").unwrap();
        assert!(wait_for(|| zone.state() == "IDLE" && light.state() == "ON"));
        assert!(hydro.is_healthy());

        hydro.stop().unwrap();
        assert_eq!(hydro.connectivity(), Some(Connectivity::Disconnected));
        assert_eq!(hydro.dispatch_stats().executed, 2);
    }

    #[test]
    fn test_stop_on_blocking_task() {
        let config = parse_config("name: quiet\npoll_interval: 0.001\n").unwrap();
        let mut hydro = Hydro::from_config(&config, Arc::new(ManualClock::new())).unwrap();
        assert_eq!(hydro.connectivity(), None);
        hydro.start().unwrap();

        let (hydro, result) = tokio_test::block_on(async move {
            tokio::task::spawn_blocking(move || {
                let result = hydro.stop();
                (hydro, result)
            })
            .await
            .unwrap()
        });
        result.unwrap();
        assert!(!hydro.controller().is_running());
    }
}
