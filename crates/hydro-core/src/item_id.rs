//! Item ID type representing a domain.object_id pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid item IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemIdError {
    #[error("item id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain cannot be empty")]
    EmptyDomain,

    #[error("object_id cannot be empty")]
    EmptyObjectId,

    #[error("domain contains invalid characters (must be lowercase alphanumeric with underscores, cannot start/end with underscore or contain double underscores)")]
    InvalidDomainChars,

    #[error("object_id contains invalid characters (must be lowercase alphanumeric with underscores, cannot start/end with underscore)")]
    InvalidObjectIdChars,
}

/// Identifies a controllable or observable item (e.g., "pump.main", "zone.bed_1")
///
/// The domain names the kind of hardware (light, pump, zone, sensor) and the
/// object_id names the instance. Both parts are lowercase alphanumeric with
/// underscores only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId {
    domain: String,
    object_id: String,
}

impl ItemId {
    /// Create a new ItemId from domain and object_id parts
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, ItemIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if domain.is_empty() {
            return Err(ItemIdError::EmptyDomain);
        }
        if object_id.is_empty() {
            return Err(ItemIdError::EmptyObjectId);
        }
        if !Self::is_valid_domain(&domain) {
            return Err(ItemIdError::InvalidDomainChars);
        }
        if !Self::is_valid_object_id(&object_id) {
            return Err(ItemIdError::InvalidObjectIdChars);
        }

        Ok(Self { domain, object_id })
    }

    /// Get the domain part of the item ID
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Get the object_id part of the item ID
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    fn is_valid_object_id(s: &str) -> bool {
        if s.starts_with('_') || s.ends_with('_') {
            return false;
        }
        s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    fn is_valid_domain(s: &str) -> bool {
        !s.contains("__") && Self::is_valid_object_id(s)
    }
}

impl FromStr for ItemId {
    type Err = ItemIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(ItemIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for ItemId {
    type Error = ItemIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> String {
        id.to_string()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
