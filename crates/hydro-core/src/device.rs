//! Devices a controller can be bound to (e.g., a serial-attached board)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::info;

/// Connection state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Connectivity {
    Connected,
    #[default]
    Disconnected,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Connected => f.write_str("CONNECTED"),
            Connectivity::Disconnected => f.write_str("DISCONNECTED"),
        }
    }
}

/// A device whose connectivity follows the controller lifecycle
pub trait Device: Send + Sync + fmt::Debug {
    /// Device name for logs
    fn name(&self) -> &str;

    /// Current connectivity
    fn connectivity(&self) -> Connectivity;

    /// Record a connectivity transition
    fn set_connectivity(&self, connectivity: Connectivity);
}

/// A board that only tracks its connectivity
#[derive(Debug)]
pub struct SimulatedBoard {
    name: String,
    connectivity: Mutex<Connectivity>,
}

impl SimulatedBoard {
    /// Create a disconnected board
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connectivity: Mutex::new(Connectivity::Disconnected),
        }
    }
}

impl Device for SimulatedBoard {
    fn name(&self) -> &str {
        &self.name
    }

    fn connectivity(&self) -> Connectivity {
        *self.connectivity.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_connectivity(&self, connectivity: Connectivity) {
        let mut current = self.connectivity.lock().unwrap_or_else(|e| e.into_inner());
        if *current != connectivity {
            info!(device = %self.name, from = %*current, to = %connectivity, "Device connectivity changed");
        }
        *current = connectivity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_starts_disconnected() {
        let board = SimulatedBoard::new("arduino");
        assert_eq!(board.name(), "arduino");
        assert_eq!(board.connectivity(), Connectivity::Disconnected);

        board.set_connectivity(Connectivity::Connected);
        assert_eq!(board.connectivity(), Connectivity::Connected);
    }

    #[test]
    fn test_connectivity_display() {
        assert_eq!(Connectivity::Connected.to_string(), "CONNECTED");
        assert_eq!(Connectivity::Disconnected.to_string(), "DISCONNECTED");
    }
}
