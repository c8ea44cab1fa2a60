//! Trigger groups and the non-owning controller handle they hold

use std::sync::{Arc, Mutex, Weak};

use hydro_triggers::SharedTrigger;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::poller::PendingChanges;

/// A weak, cloneable way to register triggers with a controller
///
/// Holding a handle never keeps the controller alive; once the controller is
/// dropped every call fails with [`EngineError::ControllerDropped`].
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    name: String,
    pending: Weak<PendingChanges>,
}

impl ControllerHandle {
    pub(crate) fn new(name: impl Into<String>, pending: &Arc<PendingChanges>) -> Self {
        Self {
            name: name.into(),
            pending: Arc::downgrade(pending),
        }
    }

    /// Name of the controller this handle points to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer a trigger for addition at the next reconciliation
    pub fn add_trigger(&self, trigger: SharedTrigger) -> EngineResult<()> {
        self.upgrade()?.add(trigger);
        Ok(())
    }

    /// Buffer a trigger for removal at the next reconciliation
    pub fn remove_trigger(&self, trigger: SharedTrigger) -> EngineResult<()> {
        self.upgrade()?.remove(trigger);
        Ok(())
    }

    /// Whether the controller still exists
    pub fn is_alive(&self) -> bool {
        self.pending.strong_count() > 0
    }

    fn upgrade(&self) -> EngineResult<Arc<PendingChanges>> {
        self.pending
            .upgrade()
            .ok_or_else(|| EngineError::ControllerDropped(self.name.clone()))
    }
}

/// A named set of triggers registered together (e.g., everything for one grow bed)
#[derive(Debug)]
pub struct TriggerGroup {
    name: String,
    triggers: Vec<SharedTrigger>,
    controller: Mutex<Option<ControllerHandle>>,
}

impl TriggerGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            controller: Mutex::new(None),
        }
    }

    /// Add a trigger to the group before it is registered
    pub fn with_trigger(mut self, trigger: SharedTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triggers(&self) -> &[SharedTrigger] {
        &self.triggers
    }

    /// Associate the group with a controller (lookup only)
    pub fn set_controller(&self, handle: ControllerHandle) {
        debug!(group = %self.name, controller = %handle.name(), "Binding group to controller");
        *self.controller.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// The controller this group was added to, if any
    pub fn controller(&self) -> Option<ControllerHandle> {
        self.controller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Request removal of every trigger in the group from its controller
    pub fn remove_all(&self) -> EngineResult<()> {
        let handle = self
            .controller()
            .ok_or_else(|| EngineError::GroupNotBound(self.name.clone()))?;
        for trigger in &self.triggers {
            handle.remove_trigger(trigger.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydro_core::SimulatedItem;
    use hydro_triggers::InstantTrigger;

    fn instant() -> SharedTrigger {
        Arc::new(InstantTrigger::new(
            Arc::new(SimulatedItem::new("pump.main".parse().unwrap(), "OFF")),
            "ON",
        ))
    }

    #[test]
    fn test_handle_buffers_into_pending() {
        let pending = Arc::new(PendingChanges::new());
        let handle = ControllerHandle::new("greenhouse", &pending);

        handle.add_trigger(instant()).unwrap();
        handle.remove_trigger(instant()).unwrap();
        assert_eq!(pending.len(), (1, 1));
        assert!(handle.is_alive());
    }

    #[test]
    fn test_handle_does_not_own_controller() {
        let pending = Arc::new(PendingChanges::new());
        let handle = ControllerHandle::new("greenhouse", &pending);
        drop(pending);

        assert!(!handle.is_alive());
        assert!(matches!(
            handle.add_trigger(instant()),
            Err(EngineError::ControllerDropped(ref name)) if name == "greenhouse"
        ));
    }

    #[test]
    fn test_group_remove_all() {
        let group = TriggerGroup::new("bed_1")
            .with_trigger(instant())
            .with_trigger(instant());
        assert!(group.controller().is_none());
        assert!(matches!(
            group.remove_all(),
            Err(EngineError::GroupNotBound(_))
        ));

        let pending = Arc::new(PendingChanges::new());
        group.set_controller(ControllerHandle::new("greenhouse", &pending));
        group.remove_all().unwrap();

        assert_eq!(group.controller().unwrap().name(), "greenhouse");
        assert_eq!(pending.len(), (0, 2));
    }
}
