//! Status values reported once per poll cycle

use std::fmt;
use std::sync::Arc;

use crate::Item;

/// An observable value of record, read for diagnostics only
pub trait StatusSource: Send + Sync + fmt::Debug {
    /// What is being reported (e.g., "sensor.level_1")
    fn label(&self) -> String;

    /// The current value
    fn status(&self) -> String;
}

/// Reports an item's state
#[derive(Debug, Clone)]
pub struct ItemStatus(pub Arc<dyn Item>);

impl StatusSource for ItemStatus {
    fn label(&self) -> String {
        self.0.id().to_string()
    }

    fn status(&self) -> String {
        self.0.state()
    }
}
