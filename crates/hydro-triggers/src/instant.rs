//! Immediate set-commands

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hydro_core::Item;
use tracing::info;

use crate::trigger::{new_trigger_id, Latch, Trigger, TriggerResult};

/// Sets an item to a state on the next poll cycle, then goes away
#[derive(Debug)]
pub struct InstantTrigger {
    id: String,
    latch: Latch,
    item: Arc<dyn Item>,
    state: String,
    executed: AtomicBool,
}

impl InstantTrigger {
    pub fn new(item: Arc<dyn Item>, state: impl Into<String>) -> Self {
        Self {
            id: new_trigger_id(),
            latch: Latch::new(),
            item,
            state: state.into(),
            executed: AtomicBool::new(false),
        }
    }
}

impl Trigger for InstantTrigger {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!("set {} -> {}", self.item.id(), self.state)
    }

    fn conditions_met(&self) -> bool {
        true
    }

    fn latch(&self) -> &Latch {
        &self.latch
    }

    fn should_not_remain(&self) -> bool {
        self.executed.load(Ordering::Acquire)
    }

    fn execute(&self) -> TriggerResult<()> {
        self.executed.store(true, Ordering::Release);
        self.item.set_state(&self.state)?;
        info!(trigger = %self.id, item = %self.item.id(), state = %self.state, "Set item state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydro_core::SimulatedItem;

    #[test]
    fn test_instant_trigger_lifecycle() {
        let pump = Arc::new(SimulatedItem::new("pump.main".parse().unwrap(), "OFF"));
        let trigger = InstantTrigger::new(pump.clone(), "ON");

        assert!(trigger.conditions_met());
        assert!(!trigger.should_not_remain());

        trigger.execute().unwrap();
        assert_eq!(pump.state(), "ON");
        assert!(trigger.conditions_met());
        assert!(trigger.should_not_remain());
        assert_eq!(trigger.describe(), "set pump.main -> ON");
    }

    #[test]
    fn test_failed_attempt_is_not_retried() {
        let pump = Arc::new(SimulatedItem::new("pump.main".parse().unwrap(), "OFF"));
        pump.set_available(false);
        let trigger = InstantTrigger::new(pump.clone(), "ON");

        assert!(trigger.execute().is_err());
        assert!(trigger.should_not_remain());
        assert_eq!(pump.state(), "OFF");
    }
}
