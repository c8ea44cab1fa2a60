//! Named item lookup

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{Item, ItemError, ItemResult};

/// Thread-safe map of item id to item
///
/// Built once from configuration and then shared read-mostly between the
/// code that wires triggers and anything reporting status.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: DashMap<String, Arc<dyn Item>>,
}

impl ItemRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item, returning the item previously stored under its id
    pub fn insert(&self, item: Arc<dyn Item>) -> Option<Arc<dyn Item>> {
        let id = item.id().to_string();
        debug!(item = %id, "Registering item");
        self.items.insert(id, item)
    }

    /// Look up an item by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn Item>> {
        self.items.get(id).map(|i| i.value().clone())
    }

    /// Look up an item by id, failing with `ItemError::NotFound`
    pub fn require(&self, id: &str) -> ItemResult<Arc<dyn Item>> {
        self.get(id)
            .ok_or_else(|| ItemError::NotFound(id.to_string()))
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.items.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of registered items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the registry holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedItem;

    #[test]
    fn test_insert_and_lookup() {
        let registry = ItemRegistry::new();
        registry.insert(Arc::new(SimulatedItem::new(
            "light.grow_1".parse().unwrap(),
            "OFF",
        )));
        registry.insert(Arc::new(SimulatedItem::new(
            "pump.main".parse().unwrap(),
            "OFF",
        )));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["light.grow_1", "pump.main"]);
        assert_eq!(registry.get("pump.main").unwrap().state(), "OFF");
        assert!(registry.get("pump.spare").is_none());
    }

    #[test]
    fn test_require_missing() {
        let registry = ItemRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.require("zone.bed_9").unwrap_err(),
            ItemError::NotFound("zone.bed_9".to_string())
        );
    }

    #[test]
    fn test_insert_replaces() {
        let registry = ItemRegistry::new();
        let id: crate::ItemId = "zone.bed_1".parse().unwrap();
        assert!(registry
            .insert(Arc::new(SimulatedItem::new(id.clone(), "IDLE")))
            .is_none());
        let previous = registry.insert(Arc::new(SimulatedItem::new(id, "FILL")));

        assert_eq!(previous.unwrap().state(), "IDLE");
        assert_eq!(registry.get("zone.bed_1").unwrap().state(), "FILL");
    }
}
