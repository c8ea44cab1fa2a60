//! Dispatcher: the single consumer of the execution queue
//!
//! Runs on its own thread, executes queued actions one at a time in FIFO
//! order, and keeps going when an action fails or panics.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, error, info, warn, Span};

use crate::error::{EngineError, EngineResult};
use crate::queue::{Action, ExecutionQueue, Job, QueueReceiver};

/// Running totals kept by the dispatcher
#[derive(Debug, Default)]
pub struct DispatchCounters {
    executed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

impl DispatchCounters {
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`DispatchCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Actions that returned `Ok`
    pub executed: u64,
    /// Actions that returned an error
    pub failed: u64,
    /// Actions that panicked
    pub panicked: u64,
}

impl DispatchStats {
    /// Every action the dispatcher has attempted
    pub fn attempted(&self) -> u64 {
        self.executed + self.failed + self.panicked
    }
}

/// Handle to a running dispatcher thread
#[derive(Debug)]
pub struct Dispatcher {
    name: String,
    queue: ExecutionQueue,
    counters: Arc<DispatchCounters>,
    handle: Option<JoinHandle<QueueReceiver>>,
}

impl Dispatcher {
    /// Start consuming `receiver` on a new thread
    ///
    /// `queue` must be the producer side of `receiver`; it is used to deliver
    /// the shutdown sentinel. The thread runs inside `span`.
    pub fn spawn(
        name: impl Into<String>,
        queue: ExecutionQueue,
        mut receiver: QueueReceiver,
        counters: Arc<DispatchCounters>,
        span: Span,
    ) -> EngineResult<Self> {
        let name = name.into();
        let thread_counters = counters.clone();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _entered = span.enter();
                run(&mut receiver, &thread_counters);
                receiver
            })
            .map_err(|source| EngineError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            queue,
            counters,
            handle: Some(handle),
        })
    }

    /// Ask the dispatcher to exit once everything queued so far has run
    ///
    /// Returns immediately; call [`Dispatcher::join`] to wait for the thread.
    pub fn stop(&self) -> EngineResult<()> {
        debug!(dispatcher = %self.name, "Requesting dispatcher stop");
        self.queue.shutdown()
    }

    /// Wait for the thread to exit, handing back the queue receiver
    pub fn join(mut self) -> EngineResult<QueueReceiver> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| EngineError::WorkerPanicked(self.name.clone()))?;
        handle
            .join()
            .map_err(|_| EngineError::WorkerPanicked(self.name.clone()))
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

/// Consume jobs until the shutdown sentinel arrives or all producers are gone
pub(crate) fn run(receiver: &mut QueueReceiver, counters: &DispatchCounters) {
    info!("Dispatcher running");
    while let Some(job) = receiver.pop_blocking() {
        match job {
            Job::Run(action) => dispatch(action, counters),
            Job::Shutdown => {
                info!("Dispatcher received shutdown");
                return;
            }
        }
    }
    info!("Execution queue closed, dispatcher exiting");
}

/// Run a single action, isolating failures and panics
pub(crate) fn dispatch(action: Action, counters: &DispatchCounters) {
    let label = action.label().to_string();
    debug!(action = %label, "Attempting action");

    match panic::catch_unwind(AssertUnwindSafe(|| action.invoke())) {
        Ok(Ok(())) => {
            counters.executed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                action = %label,
                error = %e,
                at = %Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "Action failed"
            );
        }
        Err(payload) => {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            error!(
                action = %label,
                panic = %panic_message(payload.as_ref()),
                at = %Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "Action panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
