//! Poller: the fixed-interval evaluate → enqueue → prune → reconcile loop
//!
//! The live [`TriggerSet`] belongs to the poller thread. Other threads only
//! ever touch [`PendingChanges`], which is drained once per cycle at the
//! reconciliation point, so evaluation always sees a stable set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use hydro_core::StatusSource;
use hydro_triggers::{same_trigger, SharedTrigger};
use tracing::{debug, error, info, instrument, trace, Span};

use crate::error::{EngineError, EngineResult};
use crate::queue::{Action, ExecutionQueue};

/// Default period between poll cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Add/remove requests buffered between poll cycles
///
/// Safe to use from any thread; never blocks for longer than a push.
#[derive(Debug, Default)]
pub struct PendingChanges {
    adds: Mutex<Vec<SharedTrigger>>,
    removes: Mutex<Vec<SharedTrigger>>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that a trigger be added at the next reconciliation
    pub fn add(&self, trigger: SharedTrigger) {
        trace!(trigger = %trigger.id(), "Buffering trigger add");
        self.adds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(trigger);
    }

    /// Request that a trigger be removed at the next reconciliation
    pub fn remove(&self, trigger: SharedTrigger) {
        trace!(trigger = %trigger.id(), "Buffering trigger removal");
        self.removes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(trigger);
    }

    /// Number of buffered (adds, removes)
    pub fn len(&self) -> (usize, usize) {
        (
            self.adds.lock().unwrap_or_else(|e| e.into_inner()).len(),
            self.removes.lock().unwrap_or_else(|e| e.into_inner()).len(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }

    fn take(&self) -> (Vec<SharedTrigger>, Vec<SharedTrigger>) {
        let adds = std::mem::take(&mut *self.adds.lock().unwrap_or_else(|e| e.into_inner()));
        let removes =
            std::mem::take(&mut *self.removes.lock().unwrap_or_else(|e| e.into_inner()));
        (adds, removes)
    }
}

/// The registered triggers, in registration order, each at most once
#[derive(Debug, Default)]
pub struct TriggerSet {
    triggers: Vec<SharedTrigger>,
}

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, trigger: &SharedTrigger) -> bool {
        self.position(trigger).is_some()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedTrigger> {
        self.triggers.iter()
    }

    /// Trigger ids in registration order
    pub fn ids(&self) -> Vec<String> {
        self.triggers.iter().map(|t| t.id().to_string()).collect()
    }

    fn position(&self, trigger: &SharedTrigger) -> Option<usize> {
        self.triggers.iter().position(|t| same_trigger(t, trigger))
    }

    /// Append a trigger; registering one already present is an invariant violation
    pub fn insert(&mut self, trigger: SharedTrigger) -> EngineResult<()> {
        if self.contains(&trigger) {
            return Err(EngineError::DuplicateTrigger {
                id: trigger.id().to_string(),
                description: trigger.describe(),
            });
        }
        self.triggers.push(trigger);
        Ok(())
    }

    /// Remove a trigger; removing one that is absent is an invariant violation
    pub fn remove(&mut self, trigger: &SharedTrigger) -> EngineResult<SharedTrigger> {
        let pos = self
            .position(trigger)
            .ok_or_else(|| EngineError::UnknownTrigger {
                id: trigger.id().to_string(),
                description: trigger.describe(),
            })?;
        Ok(self.triggers.remove(pos))
    }
}

/// What a single poll cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Triggers whose condition was evaluated
    pub evaluated: usize,
    /// Actions enqueued on a rising edge
    pub fired: usize,
    /// Triggers taken out of the set (pruned or explicitly removed)
    pub removed: usize,
    /// Triggers added to the set
    pub added: usize,
    /// Add/remove pairs for the same trigger that cancelled out
    pub cancelled: usize,
}

/// One poller's state: the live set plus everything a cycle touches
#[derive(Debug)]
pub struct PollCycle {
    set: TriggerSet,
    pending: Arc<PendingChanges>,
    queue: ExecutionQueue,
    status: Option<Arc<dyn StatusSource>>,
}

impl PollCycle {
    pub fn new(
        set: TriggerSet,
        pending: Arc<PendingChanges>,
        queue: ExecutionQueue,
        status: Option<Arc<dyn StatusSource>>,
    ) -> Self {
        Self {
            set,
            pending,
            queue,
            status,
        }
    }

    /// Run one full cycle
    ///
    /// Order: evaluate and enqueue on rising edges, prune exhausted triggers,
    /// apply buffered removals, apply buffered additions, report status.
    /// Fails on an invariant violation or a closed queue; the set must not be
    /// used for further cycles after an error.
    pub fn run_once(&mut self) -> EngineResult<CycleReport> {
        let mut report = CycleReport {
            evaluated: self.set.len(),
            ..CycleReport::default()
        };

        report.fired = self.handle_triggers()?;
        let pruned = self.exhausted_triggers();
        self.reconcile(pruned, &mut report)?;
        self.report_status();

        trace!(?report, "Poll cycle complete");
        Ok(report)
    }

    /// Evaluate every trigger, enqueueing its action on a false→true edge
    fn handle_triggers(&self) -> EngineResult<usize> {
        let mut fired = 0;
        for trigger in self.set.iter() {
            if trigger.conditions_met() {
                // Latch first: only the caller that flips it enqueues
                if trigger.latch().engage() {
                    debug!(trigger = %trigger.id(), description = %trigger.describe(), "Trigger fired");
                    self.queue.push(Action::for_trigger(trigger))?;
                    fired += 1;
                }
            } else {
                trigger.latch().release();
            }
        }
        Ok(fired)
    }

    fn exhausted_triggers(&self) -> Vec<SharedTrigger> {
        self.set
            .iter()
            .filter(|t| t.should_not_remain())
            .cloned()
            .collect()
    }

    /// Apply buffered removals (plus pruned triggers), then buffered additions
    ///
    /// A trigger both added and removed within the same window cancels out
    /// and never enters the set.
    fn reconcile(
        &mut self,
        pruned: Vec<SharedTrigger>,
        report: &mut CycleReport,
    ) -> EngineResult<()> {
        let (mut adds, mut removes) = self.pending.take();

        for trigger in pruned {
            if !removes.iter().any(|r| same_trigger(r, &trigger)) {
                debug!(trigger = %trigger.id(), "Pruning exhausted trigger");
                removes.push(trigger);
            }
        }

        for trigger in removes {
            if let Some(pos) = adds.iter().position(|a| same_trigger(a, &trigger)) {
                debug!(trigger = %trigger.id(), "Add and remove in same cycle cancelled");
                adds.remove(pos);
                report.cancelled += 1;
                continue;
            }
            self.set.remove(&trigger)?;
            report.removed += 1;
        }

        for trigger in adds {
            debug!(trigger = %trigger.id(), description = %trigger.describe(), "Adding trigger");
            self.set.insert(trigger)?;
            report.added += 1;
        }
        Ok(())
    }

    fn report_status(&self) {
        if let Some(status) = &self.status {
            debug!(source = %status.label(), status = %status.status(), "Status of record");
        }
    }

    pub fn triggers(&self) -> &TriggerSet {
        &self.set
    }

    pub fn into_triggers(self) -> TriggerSet {
        self.set
    }
}

/// Handle to a running poller thread
#[derive(Debug)]
pub struct Poller {
    name: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<EngineResult<TriggerSet>>>,
}

impl Poller {
    /// Start running `cycle` every `interval` on a new thread
    ///
    /// The thread runs inside `span` and hands the live set back on exit.
    pub fn spawn(
        name: impl Into<String>,
        cycle: PollCycle,
        interval: Duration,
        span: Span,
    ) -> EngineResult<Self> {
        let name = name.into();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _entered = span.enter();
                poll_loop(cycle, interval, &thread_running)
            })
            .map_err(|source| EngineError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            running,
            handle: Some(handle),
        })
    }

    /// Ask the loop to exit at the next cycle boundary; returns immediately
    pub fn stop(&self) {
        debug!(poller = %self.name, "Requesting poller stop");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the loop is still meant to run
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the thread to exit
    ///
    /// Returns the live trigger set, or the error that terminated the loop.
    pub fn join(mut self) -> EngineResult<TriggerSet> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| EngineError::WorkerPanicked(self.name.clone()))?;
        handle
            .join()
            .map_err(|_| EngineError::WorkerPanicked(self.name.clone()))?
    }
}

#[instrument(skip_all)]
fn poll_loop(
    mut cycle: PollCycle,
    interval: Duration,
    running: &AtomicBool,
) -> EngineResult<TriggerSet> {
    info!(interval = ?interval, triggers = cycle.triggers().len(), "Poll loop running");

    while running.load(Ordering::SeqCst) {
        if let Err(e) = cycle.run_once() {
            error!(error = %e, "Poll cycle aborted, stopping poller");
            running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        std::thread::sleep(interval);
    }

    info!(triggers = cycle.triggers().len(), "Poll loop stopped");
    Ok(cycle.into_triggers())
}
