//! Items: the lights, pumps, zones and sensors a controller acts on
//!
//! The engine never looks inside an item. Triggers read an item's state to
//! decide whether their condition holds and write a target state when their
//! action runs.

use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ItemId;

/// Item errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("item {0} is unavailable")]
    Unavailable(ItemId),

    #[error("item {item} rejected state '{state}': {reason}")]
    Rejected {
        item: ItemId,
        state: String,
        reason: String,
    },
}

/// Result type for item operations
pub type ItemResult<T> = Result<T, ItemError>;

/// Capability contract for anything a trigger can observe or drive
pub trait Item: Send + Sync + fmt::Debug {
    /// The item's identifier
    fn id(&self) -> &ItemId;

    /// Current state value (e.g., "ON", "OFF", "FILL", "HIGH")
    fn state(&self) -> String;

    /// Drive the item to a new state
    fn set_state(&self, state: &str) -> ItemResult<()>;
}

/// A state value together with its change timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemState {
    /// The state value
    pub value: String,

    /// When the value last changed (different from previous value)
    pub last_changed: DateTime<Utc>,

    /// When the value was last written (even if unchanged)
    pub last_updated: DateTime<Utc>,
}

impl ItemState {
    /// Create a new state with current timestamp
    pub fn new(value: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            value: value.into(),
            last_changed: now,
            last_updated: now,
        }
    }

    /// Create an updated state, preserving last_changed if the value is the same
    pub fn with_update(&self, value: impl Into<String>) -> Self {
        let now = Utc::now();
        let value = value.into();
        let changed = self.value != value;

        Self {
            last_changed: if changed { now } else { self.last_changed },
            last_updated: now,
            value,
        }
    }
}

impl PartialEq for ItemState {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps are not compared
        self.value == other.value
    }
}

#[derive(Debug)]
struct SimulatedInner {
    state: ItemState,
    available: bool,
    writes: usize,
}

/// In-memory item used when no hardware is attached
///
/// Optionally restricts the states it accepts, and can be taken offline to
/// exercise the failure paths of whatever drives it.
#[derive(Debug)]
pub struct SimulatedItem {
    id: ItemId,
    allowed: Option<Vec<String>>,
    inner: RwLock<SimulatedInner>,
}

impl SimulatedItem {
    /// Create an available item in the given initial state
    pub fn new(id: ItemId, initial: impl Into<String>) -> Self {
        Self {
            id,
            allowed: None,
            inner: RwLock::new(SimulatedInner {
                state: ItemState::new(initial),
                available: true,
                writes: 0,
            }),
        }
    }

    /// Only accept the listed states
    pub fn with_allowed_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(states.into_iter().map(Into::into).collect());
        self
    }

    /// Take the item online or offline
    pub fn set_available(&self, available: bool) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .available = available;
    }

    /// Full state snapshot including timestamps
    pub fn snapshot(&self) -> ItemState {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .state
            .clone()
    }

    /// Number of successful `set_state` calls
    pub fn write_count(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).writes
    }
}

impl Item for SimulatedItem {
    fn id(&self) -> &ItemId {
        &self.id
    }

    fn state(&self) -> String {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .state
            .value
            .clone()
    }

    fn set_state(&self, state: &str) -> ItemResult<()> {
        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|s| s == state) {
                return Err(ItemError::Rejected {
                    item: self.id.clone(),
                    state: state.to_string(),
                    reason: format!("expected one of {}", allowed.join(", ")),
                });
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if !inner.available {
            return Err(ItemError::Unavailable(self.id.clone()));
        }

        debug!(item = %self.id, from = %inner.state.value, to = %state, "Setting item state");
        inner.state = inner.state.with_update(state);
        inner.writes += 1;
        Ok(())
    }
}
