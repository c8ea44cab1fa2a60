//! Controller: owns one poller and one dispatcher sharing one execution queue
//!
//! Registration methods may be called from any thread, before or after
//! `start`. The live trigger set is handed back by the poller on `stop` and
//! reused by the next `start`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hydro_core::{Clock, Item, StatusSource};
use hydro_triggers::{ClockTrigger, InstantTrigger, RepeatBy, SharedTrigger, DEFAULT_WINDOW};
use tracing::{error, info, info_span, warn};

use crate::dispatcher::{DispatchCounters, DispatchStats, Dispatcher};
use crate::error::{EngineError, EngineResult};
use crate::group::{ControllerHandle, TriggerGroup};
use crate::poller::{PendingChanges, PollCycle, Poller, TriggerSet, DEFAULT_POLL_INTERVAL};
use crate::queue::{execution_queue, ExecutionQueue, QueueReceiver};

/// Timing settings for a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Period between poll cycles
    pub poll_interval: Duration,
    /// Window used by `schedule*` when none is given
    pub default_window: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_window: DEFAULT_WINDOW,
        }
    }
}

/// What the controller keeps while its workers are not running
#[derive(Debug)]
struct Parked {
    receiver: QueueReceiver,
    triggers: TriggerSet,
}

#[derive(Debug)]
struct Workers {
    poller: Poller,
    dispatcher: Dispatcher,
}

/// Automation controller
pub struct Controller {
    name: String,
    settings: ControllerSettings,
    pending: Arc<PendingChanges>,
    queue: ExecutionQueue,
    parked: Option<Parked>,
    workers: Option<Workers>,
    status: Option<Arc<dyn StatusSource>>,
    counters: Arc<DispatchCounters>,
    groups: DashMap<String, Arc<TriggerGroup>>,
}

impl Controller {
    /// Create a stopped controller
    pub fn new(name: impl Into<String>, settings: ControllerSettings) -> Self {
        let (queue, receiver) = execution_queue();
        Self {
            name: name.into(),
            settings,
            pending: Arc::new(PendingChanges::new()),
            queue,
            parked: Some(Parked {
                receiver,
                triggers: TriggerSet::new(),
            }),
            workers: None,
            status: None,
            counters: Arc::new(DispatchCounters::default()),
            groups: DashMap::new(),
        }
    }

    /// Report this value once per poll cycle
    pub fn with_status(mut self, status: Arc<dyn StatusSource>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_some()
    }

    /// Running, and neither worker thread has exited on its own
    pub fn is_healthy(&self) -> bool {
        self.workers
            .as_ref()
            .is_some_and(|w| !w.poller.is_finished() && !w.dispatcher.is_finished())
    }

    /// Start the dispatcher, then the poller
    pub fn start(&mut self) -> EngineResult<()> {
        if self.workers.is_some() {
            return Err(EngineError::AlreadyRunning(self.name.clone()));
        }
        let Parked { receiver, triggers } = self.take_parked();

        info!(controller = %self.name, triggers = triggers.len(), "Starting controller");

        let dispatcher = match Dispatcher::spawn(
            format!("{} exec loop", self.name),
            self.queue.clone(),
            receiver,
            self.counters.clone(),
            info_span!("dispatcher", controller = %self.name),
        ) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                self.park(None, triggers);
                return Err(e);
            }
        };

        let cycle = PollCycle::new(
            triggers,
            self.pending.clone(),
            self.queue.clone(),
            self.status.clone(),
        );
        let poller = match Poller::spawn(
            format!("{} poll loop", self.name),
            cycle,
            self.settings.poll_interval,
            info_span!("poller", controller = %self.name),
        ) {
            Ok(poller) => poller,
            Err(e) => {
                // The cycle (and its trigger set) went down with the failed spawn
                let receiver = Self::shutdown_dispatcher(dispatcher).ok();
                self.park(receiver, TriggerSet::new());
                return Err(e);
            }
        };

        self.workers = Some(Workers { poller, dispatcher });
        Ok(())
    }

    /// Stop the poller and wait for it, then stop the dispatcher and wait for it
    ///
    /// Returns the error that terminated either worker, poller first.
    pub fn stop(&mut self) -> EngineResult<()> {
        let Workers { poller, dispatcher } = self
            .workers
            .take()
            .ok_or_else(|| EngineError::NotRunning(self.name.clone()))?;

        info!(controller = %self.name, "Stopping controller");

        poller.stop();
        let polled = poller.join();
        let dispatched = Self::shutdown_dispatcher(dispatcher);

        let (triggers, poll_err) = match polled {
            Ok(set) => (set, None),
            Err(e) => {
                error!(controller = %self.name, error = %e, "Poller terminated with error");
                (TriggerSet::new(), Some(e))
            }
        };
        let (receiver, dispatch_err) = match dispatched {
            Ok(rx) => (Some(rx), None),
            Err(e) => {
                error!(controller = %self.name, error = %e, "Dispatcher terminated with error");
                (None, Some(e))
            }
        };
        self.park(receiver, triggers);

        info!(controller = %self.name, stats = ?self.dispatch_stats(), "Controller stopped");
        match poll_err.or(dispatch_err) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn shutdown_dispatcher(dispatcher: Dispatcher) -> EngineResult<QueueReceiver> {
        dispatcher.stop()?;
        dispatcher.join()
    }

    fn take_parked(&mut self) -> Parked {
        self.parked.take().unwrap_or_else(|| {
            let (queue, receiver) = execution_queue();
            self.queue = queue;
            Parked {
                receiver,
                triggers: TriggerSet::new(),
            }
        })
    }

    /// Keep state for the next start; a lost receiver means a fresh queue
    fn park(&mut self, receiver: Option<QueueReceiver>, triggers: TriggerSet) {
        let receiver = receiver.unwrap_or_else(|| {
            let (queue, receiver) = execution_queue();
            self.queue = queue;
            receiver
        });
        self.parked = Some(Parked { receiver, triggers });
    }

    /// The live trigger set, available while stopped
    pub fn triggers(&self) -> Option<&TriggerSet> {
        self.parked.as_ref().map(|p| &p.triggers)
    }

    /// Register a trigger at the next cycle boundary
    pub fn add_trigger(&self, trigger: SharedTrigger) {
        self.pending.add(trigger);
    }

    /// Deregister a trigger at the next cycle boundary
    pub fn remove_trigger(&self, trigger: SharedTrigger) {
        self.pending.remove(trigger);
    }

    /// Set an item to a state on the next cycle
    pub fn set(&self, item: Arc<dyn Item>, state: impl Into<String>) -> SharedTrigger {
        let trigger: SharedTrigger = Arc::new(InstantTrigger::new(item, state));
        self.add_trigger(trigger.clone());
        trigger
    }

    /// Drive an item to a target state inside a clock window
    ///
    /// `window` falls back to the controller's default window, shortened to
    /// close before the next opening when it would not.
    pub fn schedule(
        &self,
        item: Arc<dyn Item>,
        target_state: impl Into<String>,
        clock: Arc<dyn Clock>,
        start: DateTime<Utc>,
        window: Option<Duration>,
        repeat_by: RepeatBy,
    ) -> EngineResult<SharedTrigger> {
        let window = window.unwrap_or_else(|| repeat_by.fit_window(self.settings.default_window));
        let trigger: SharedTrigger = Arc::new(ClockTrigger::new(
            item,
            target_state,
            clock,
            start,
            window,
            repeat_by,
        )?);
        self.add_trigger(trigger.clone());
        Ok(trigger)
    }

    pub fn schedule_once(
        &self,
        item: Arc<dyn Item>,
        target_state: impl Into<String>,
        clock: Arc<dyn Clock>,
        start: DateTime<Utc>,
        window: Option<Duration>,
    ) -> EngineResult<SharedTrigger> {
        self.schedule(item, target_state, clock, start, window, RepeatBy::Once)
    }

    pub fn schedule_every_day(
        &self,
        item: Arc<dyn Item>,
        target_state: impl Into<String>,
        clock: Arc<dyn Clock>,
        start: DateTime<Utc>,
        window: Option<Duration>,
    ) -> EngineResult<SharedTrigger> {
        self.schedule(item, target_state, clock, start, window, RepeatBy::Day)
    }

    pub fn schedule_every_hour(
        &self,
        item: Arc<dyn Item>,
        target_state: impl Into<String>,
        clock: Arc<dyn Clock>,
        start: DateTime<Utc>,
        window: Option<Duration>,
    ) -> EngineResult<SharedTrigger> {
        self.schedule(item, target_state, clock, start, window, RepeatBy::Hour)
    }

    pub fn schedule_every_minute(
        &self,
        item: Arc<dyn Item>,
        target_state: impl Into<String>,
        clock: Arc<dyn Clock>,
        start: DateTime<Utc>,
        window: Option<Duration>,
    ) -> EngineResult<SharedTrigger> {
        self.schedule(item, target_state, clock, start, window, RepeatBy::Minute)
    }

    /// Register every trigger of a group and bind the group to this controller
    pub fn add_group(&self, group: Arc<TriggerGroup>) -> EngineResult<()> {
        use dashmap::mapref::entry::Entry;

        match self.groups.entry(group.name().to_string()) {
            Entry::Occupied(_) => return Err(EngineError::DuplicateGroup(group.name().to_string())),
            Entry::Vacant(slot) => {
                slot.insert(group.clone());
            }
        }

        group.set_controller(self.handle());
        for trigger in group.triggers() {
            self.add_trigger(trigger.clone());
        }
        info!(controller = %self.name, group = %group.name(), triggers = group.triggers().len(), "Added group");
        Ok(())
    }

    /// Look up a group by name
    pub fn group(&self, name: &str) -> Option<Arc<TriggerGroup>> {
        self.groups.get(name).map(|g| g.value().clone())
    }

    /// A non-owning handle for registering triggers from elsewhere
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle::new(self.name.clone(), &self.pending)
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.workers.is_some() {
            warn!(controller = %self.name, "Controller dropped while running, stopping");
            if let Err(e) = self.stop() {
                error!(controller = %self.name, error = %e, "Error stopping controller on drop");
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .field("groups", &self.groups.len())
            .finish_non_exhaustive()
    }
}
