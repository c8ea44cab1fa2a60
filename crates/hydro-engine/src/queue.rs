//! Execution queue shared by the poller (producer) and dispatcher (consumer)
//!
//! An unbounded FIFO of [`Job`]s. Producers hold cheap clones of
//! [`ExecutionQueue`]; the single consumer owns the [`QueueReceiver`].

use std::fmt;

use hydro_triggers::{SharedTrigger, TriggerResult};
use tokio::sync::mpsc;

use crate::error::{EngineError, EngineResult};

type ActionFn = Box<dyn FnOnce() -> TriggerResult<()> + Send>;

/// A zero-argument action captured at enqueue time
pub struct Action {
    label: String,
    run: ActionFn,
}

impl Action {
    /// Wrap an arbitrary closure
    pub fn new<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> TriggerResult<()> + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }

    /// Run a trigger's `execute`
    pub fn for_trigger(trigger: &SharedTrigger) -> Self {
        let label = format!("{} [{}]", trigger.describe(), trigger.id());
        let trigger = trigger.clone();
        Self::new(label, move || trigger.execute())
    }

    /// What the action does, for logs
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn invoke(self) -> TriggerResult<()> {
        (self.run)()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// An entry in the execution queue
#[derive(Debug)]
pub enum Job {
    /// Run an action
    Run(Action),
    /// Wake the consumer and make it exit after everything queued before
    Shutdown,
}

/// Producer side of the execution queue
#[derive(Debug, Clone)]
pub struct ExecutionQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl ExecutionQueue {
    /// Enqueue an action; never blocks
    pub fn push(&self, action: Action) -> EngineResult<()> {
        self.tx
            .send(Job::Run(action))
            .map_err(|_| EngineError::QueueClosed)
    }

    /// Enqueue the shutdown sentinel
    pub fn shutdown(&self) -> EngineResult<()> {
        self.tx
            .send(Job::Shutdown)
            .map_err(|_| EngineError::QueueClosed)
    }

    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the execution queue
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl QueueReceiver {
    /// Block the current thread until a job arrives
    ///
    /// Returns `None` once every producer has been dropped and the queue is
    /// empty. Must not be called from inside an async runtime.
    pub fn pop_blocking(&mut self) -> Option<Job> {
        self.rx.blocking_recv()
    }

    /// Take the next job if one is waiting
    pub fn try_pop(&mut self) -> Option<Job> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected producer/consumer pair
pub fn execution_queue() -> (ExecutionQueue, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ExecutionQueue { tx }, QueueReceiver { rx })
}
