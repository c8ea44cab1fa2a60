//! Trigger capability contract
//!
//! A trigger pairs a condition with an action. The poll loop asks every
//! registered trigger whether its conditions are met, uses the trigger's
//! [`Latch`] to fire only on a false→true edge, and prunes triggers that
//! report they should not remain.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hydro_core::ItemError;
use thiserror::Error;

/// Trigger errors
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Item error: {0}")]
    Item(#[from] ItemError),

    #[error("Invalid trigger configuration: {0}")]
    InvalidConfig(String),

    #[error("Action failed: {0}")]
    Failed(String),
}

/// Result type for trigger operations
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Edge-detection flag owned by each trigger
///
/// Engaged when the trigger fires, released once its condition stops
/// holding. While engaged the trigger does not fire again.
#[derive(Debug, Default)]
pub struct Latch(AtomicBool);

impl Latch {
    /// Create a released latch
    pub fn new() -> Self {
        Self::default()
    }

    /// Engage the latch, returning `true` if it was released before
    ///
    /// The check and the set are a single atomic step, so exactly one caller
    /// observes each rising edge.
    pub fn engage(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// Release the latch, re-arming the trigger
    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Whether the latch is currently engaged
    pub fn is_engaged(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What the poll loop needs from a trigger
///
/// Identity is reference identity: two registrations are the same trigger
/// only if they point at the same allocation (see [`same_trigger`]).
pub trait Trigger: Send + Sync + fmt::Debug {
    /// Unique id used in logs
    fn id(&self) -> &str;

    /// Human-readable summary (e.g., "clock light.grow_1 -> HIGH every day")
    fn describe(&self) -> String;

    /// Whether the trigger's condition currently holds
    fn conditions_met(&self) -> bool;

    /// The trigger's latch
    fn latch(&self) -> &Latch;

    /// Whether the trigger is exhausted and should be pruned
    fn should_not_remain(&self) -> bool;

    /// Run the trigger's action
    fn execute(&self) -> TriggerResult<()>;

    /// Whether the trigger has fired and its condition has not yet dropped
    fn latched(&self) -> bool {
        self.latch().is_engaged()
    }
}

/// A registered trigger
pub type SharedTrigger = Arc<dyn Trigger>;

/// Whether two handles refer to the same trigger instance
pub fn same_trigger(a: &SharedTrigger, b: &SharedTrigger) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

pub(crate) fn new_trigger_id() -> String {
    ulid::Ulid::new().to_string()
}
