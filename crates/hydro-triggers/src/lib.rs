//! Triggers for the hydro automation engine
//!
//! A trigger is a condition-plus-action pair. The engine only relies on the
//! [`Trigger`] capability contract; the variants here are the ones the
//! controller knows how to build:
//!
//! - [`ClockTrigger`] - target state inside a (repeating) clock window
//! - [`InstantTrigger`] - one-shot set-command
//! - [`OverflowTrigger`] - zone to a safe state when a level sensor trips
//! - [`LightTrigger`] - light state coupled to a zone state

mod coupling;
mod instant;
mod schedule;
mod trigger;

pub use coupling::{LightTrigger, OverflowTrigger, DEFAULT_SAFE_STATE, DEFAULT_TRIPPED_STATE};
pub use instant::InstantTrigger;
pub use schedule::{ClockTrigger, RepeatBy, DEFAULT_WINDOW};
pub use trigger::{same_trigger, Latch, SharedTrigger, Trigger, TriggerError, TriggerResult};
