//! Automation engine for hydro
//!
//! A [`Controller`] runs two threads around one execution queue:
//!
//! - the poller evaluates every registered trigger at a fixed interval and
//!   enqueues a trigger's action each time its condition goes from false to
//!   true, then prunes exhausted triggers and applies buffered add/remove
//!   requests
//! - the dispatcher takes actions off the queue one at a time, in the order
//!   they were enqueued, logging failures without stopping
//!
//! Triggers may be registered from any thread at any time; they join the
//! evaluated set at the next cycle boundary.

mod controller;
mod device;
mod dispatcher;
mod error;
mod group;
mod poller;
mod queue;

pub use controller::{Controller, ControllerSettings};
pub use device::DeviceController;
pub use dispatcher::{DispatchCounters, DispatchStats, Dispatcher};
pub use error::{EngineError, EngineResult};
pub use group::{ControllerHandle, TriggerGroup};
pub use poller::{
    CycleReport, PendingChanges, PollCycle, Poller, TriggerSet, DEFAULT_POLL_INTERVAL,
};
pub use queue::{execution_queue, Action, ExecutionQueue, Job, QueueReceiver};
