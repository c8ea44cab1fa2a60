//! State-coupled triggers: one item's state drives another item
//!
//! Both variants stay registered for the lifetime of the controller and fire
//! every time their watched state is entered.

use std::sync::Arc;

use hydro_core::Item;
use tracing::{info, warn};

use crate::trigger::{new_trigger_id, Latch, Trigger, TriggerResult};

/// Sensor state that signals an overflowing zone
pub const DEFAULT_TRIPPED_STATE: &str = "HIGH";

/// Zone state applied when an overflow is detected
pub const DEFAULT_SAFE_STATE: &str = "IDLE";

/// Puts a zone into a safe state when its overflow sensor trips
#[derive(Debug)]
pub struct OverflowTrigger {
    id: String,
    latch: Latch,
    zone: Arc<dyn Item>,
    sensor: Arc<dyn Item>,
    tripped_state: String,
    safe_state: String,
}

impl OverflowTrigger {
    pub fn new(zone: Arc<dyn Item>, sensor: Arc<dyn Item>) -> Self {
        Self {
            id: new_trigger_id(),
            latch: Latch::new(),
            zone,
            sensor,
            tripped_state: DEFAULT_TRIPPED_STATE.to_string(),
            safe_state: DEFAULT_SAFE_STATE.to_string(),
        }
    }

    /// Override the tripped sensor state and the safe zone state
    pub fn with_states(mut self, tripped: impl Into<String>, safe: impl Into<String>) -> Self {
        self.tripped_state = tripped.into();
        self.safe_state = safe.into();
        self
    }
}

impl Trigger for OverflowTrigger {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!(
            "overflow {} == {} => {} -> {}",
            self.sensor.id(),
            self.tripped_state,
            self.zone.id(),
            self.safe_state
        )
    }

    fn conditions_met(&self) -> bool {
        self.sensor.state() == self.tripped_state
    }

    fn latch(&self) -> &Latch {
        &self.latch
    }

    fn should_not_remain(&self) -> bool {
        false
    }

    fn execute(&self) -> TriggerResult<()> {
        warn!(
            zone = %self.zone.id(),
            sensor = %self.sensor.id(),
            "Overflow detected, moving zone to safe state"
        );
        self.zone.set_state(&self.safe_state)?;
        Ok(())
    }
}

/// Sets a light whenever a zone enters a given state
#[derive(Debug)]
pub struct LightTrigger {
    id: String,
    latch: Latch,
    zone: Arc<dyn Item>,
    zone_state: String,
    light: Arc<dyn Item>,
    light_state: String,
}

impl LightTrigger {
    pub fn new(
        zone: Arc<dyn Item>,
        zone_state: impl Into<String>,
        light: Arc<dyn Item>,
        light_state: impl Into<String>,
    ) -> Self {
        Self {
            id: new_trigger_id(),
            latch: Latch::new(),
            zone,
            zone_state: zone_state.into(),
            light,
            light_state: light_state.into(),
        }
    }
}

impl Trigger for LightTrigger {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!(
            "light {} == {} => {} -> {}",
            self.zone.id(),
            self.zone_state,
            self.light.id(),
            self.light_state
        )
    }

    fn conditions_met(&self) -> bool {
        self.zone.state() == self.zone_state
    }

    fn latch(&self) -> &Latch {
        &self.latch
    }

    fn should_not_remain(&self) -> bool {
        false
    }

    fn execute(&self) -> TriggerResult<()> {
        self.light.set_state(&self.light_state)?;
        info!(
            light = %self.light.id(),
            state = %self.light_state,
            zone = %self.zone.id(),
            "Light follows zone"
        );
        Ok(())
    }
}
