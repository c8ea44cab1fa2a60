//! Core types for hydro
//!
//! This crate provides the collaborators the automation engine and its
//! triggers act upon: ItemId, the Item contract and an in-memory item,
//! clocks, devices, and status sources.

mod clock;
mod device;
pub mod hms;
mod item;
mod item_id;
mod registry;
mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{Connectivity, Device, SimulatedBoard};
pub use hms::{format_hms, parse_hms, HmsError};
pub use item::{Item, ItemError, ItemResult, ItemState, SimulatedItem};
pub use item_id::{ItemId, ItemIdError};
pub use registry::ItemRegistry;
pub use status::{ItemStatus, StatusSource};
