//! Controller configuration
//!
//! ```yaml
//! name: greenhouse
//! poll_interval: 1            # seconds, or "HH:MM:SS"
//! default_window: "00:01:00"
//! status_item: sensor.level_1
//! device: arduino
//! items:
//!   - id: light.grow_1
//!     state: "OFF"
//!   - id: zone.bed_1
//!     state: IDLE
//!     states: [IDLE, FLOOD, DRAIN]
//! triggers:
//!   - trigger: schedule
//!     item: light.grow_1
//!     state: HIGH
//!     start: "06:00:00"
//!     repeat: day
//! groups:
//!   - name: bed_1
//!     triggers:
//!       - trigger: overflow
//!         zone: zone.bed_1
//!         sensor: sensor.level_1
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use hydro_core::hms::duration_hms;
use hydro_core::{Clock, ItemId, ItemRegistry, SimulatedItem};
use hydro_triggers::{
    ClockTrigger, InstantTrigger, LightTrigger, OverflowTrigger, RepeatBy, SharedTrigger,
    DEFAULT_WINDOW,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;

/// A duration written as seconds or `HH:MM:SS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hms(#[serde(with = "duration_hms")] pub Duration);

/// Top-level controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller name, used for thread names and logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Period between poll cycles
    #[serde(default = "default_poll_interval", with = "duration_hms")]
    pub poll_interval: Duration,

    /// Window for schedules that do not give one
    #[serde(default = "default_window", with = "duration_hms")]
    pub default_window: Duration,

    /// Item whose state is reported once per cycle
    #[serde(default)]
    pub status_item: Option<String>,

    /// Device the controller is bound to
    #[serde(default)]
    pub device: Option<String>,

    #[serde(default)]
    pub items: Vec<ItemConfig>,

    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,

    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

fn default_name() -> String {
    "hydro".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_window() -> Duration {
    DEFAULT_WINDOW
}

/// An item and its initial state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfig {
    pub id: String,
    pub state: String,
    /// If given, the item rejects any other state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<String>>,
}

/// A named set of triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

/// Trigger definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Clock window (see [`ClockTrigger`])
    Schedule {
        item: String,
        state: String,
        /// Time of day the first window opens, on the clock's current date
        start: NaiveTime,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window: Option<Hms>,
        #[serde(default)]
        repeat: RepeatBy,
    },

    /// Set an item on the first cycle
    Set { item: String, state: String },

    /// Zone to a safe state when its level sensor trips
    Overflow {
        zone: String,
        sensor: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tripped: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        safe: Option<String>,
    },

    /// Light follows a zone state
    Light {
        zone: String,
        when: String,
        light: String,
        state: String,
    },
}

impl TriggerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerConfig::Schedule { .. } => "schedule",
            TriggerConfig::Set { .. } => "set",
            TriggerConfig::Overflow { .. } => "overflow",
            TriggerConfig::Light { .. } => "light",
        }
    }

    /// Every item id this trigger refers to
    pub fn items(&self) -> Vec<&str> {
        match self {
            TriggerConfig::Schedule { item, .. } | TriggerConfig::Set { item, .. } => {
                vec![item.as_str()]
            }
            TriggerConfig::Overflow { zone, sensor, .. } => vec![zone.as_str(), sensor.as_str()],
            TriggerConfig::Light { zone, light, .. } => vec![zone.as_str(), light.as_str()],
        }
    }

    /// Build the trigger against declared items
    pub fn build(
        &self,
        registry: &ItemRegistry,
        clock: &Arc<dyn Clock>,
        default_window: Duration,
    ) -> ConfigResult<SharedTrigger> {
        let lookup = |id: &str| {
            registry.get(id).ok_or_else(|| ConfigError::UnknownItem {
                item: id.to_string(),
                context: format!("{} trigger", self.kind()),
            })
        };

        let trigger: SharedTrigger = match self {
            TriggerConfig::Schedule {
                item,
                state,
                start,
                window,
                repeat,
            } => {
                let window = window.map_or_else(|| repeat.fit_window(default_window), |w| w.0);
                let trigger = ClockTrigger::new(
                    lookup(item.as_str())?,
                    state.clone(),
                    clock.clone(),
                    clock.today_at(*start),
                    window,
                    *repeat,
                )
                .map_err(|e| ConfigError::InvalidValue {
                    key: format!("schedule {item}"),
                    reason: e.to_string(),
                })?;
                Arc::new(trigger)
            }
            TriggerConfig::Set { item, state } => {
                Arc::new(InstantTrigger::new(lookup(item.as_str())?, state.clone()))
            }
            TriggerConfig::Overflow {
                zone,
                sensor,
                tripped,
                safe,
            } => {
                let mut trigger =
                    OverflowTrigger::new(lookup(zone.as_str())?, lookup(sensor.as_str())?);
                if tripped.is_some() || safe.is_some() {
                    trigger = trigger.with_states(
                        tripped.as_deref().unwrap_or(hydro_triggers::DEFAULT_TRIPPED_STATE),
                        safe.as_deref().unwrap_or(hydro_triggers::DEFAULT_SAFE_STATE),
                    );
                }
                Arc::new(trigger)
            }
            TriggerConfig::Light {
                zone,
                when,
                light,
                state,
            } => Arc::new(LightTrigger::new(
                lookup(zone.as_str())?,
                when.clone(),
                lookup(light.as_str())?,
                state.clone(),
            )),
        };
        debug!(trigger = %trigger.id(), description = %trigger.describe(), "Built trigger");
        Ok(trigger)
    }
}

impl ControllerConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = path.file_name().map(Path::new).unwrap_or(path);
        let value = YamlLoader::new(dir).load_file(file)?;
        let config: Self =
            serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration from a YAML string
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let value = YamlLoader::new(".").load_string(content, Path::new("<string>"))?;
        let config: Self =
            serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
                path: "<string>".into(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check ids, references and windows
    pub fn validate(&self) -> ConfigResult<()> {
        let mut declared = HashSet::new();
        for item in &self.items {
            item.id
                .parse::<ItemId>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: format!("items.{}", item.id),
                    reason: e.to_string(),
                })?;
            if !declared.insert(item.id.as_str()) {
                return Err(ConfigError::DuplicateItem(item.id.clone()));
            }
            if let Some(states) = &item.states {
                if !states.contains(&item.state) {
                    return Err(ConfigError::InvalidValue {
                        key: format!("items.{}", item.id),
                        reason: format!("initial state '{}' is not one of its states", item.state),
                    });
                }
            }
        }

        if let Some(status) = &self.status_item {
            if !declared.contains(status.as_str()) {
                return Err(ConfigError::UnknownItem {
                    item: status.clone(),
                    context: "status_item".to_string(),
                });
            }
        }

        if self.default_window.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "default_window".to_string(),
                reason: "window must be longer than zero".to_string(),
            });
        }

        let check = |trigger: &TriggerConfig, context: &str| -> ConfigResult<()> {
            for item in trigger.items() {
                if !declared.contains(item) {
                    return Err(ConfigError::UnknownItem {
                        item: item.to_string(),
                        context: format!("{context} ({} trigger)", trigger.kind()),
                    });
                }
            }
            if let TriggerConfig::Schedule {
                window: Some(window),
                item,
                ..
            } = trigger
            {
                if window.0.is_zero() {
                    return Err(ConfigError::InvalidValue {
                        key: format!("{context} schedule {item}"),
                        reason: "window must be longer than zero".to_string(),
                    });
                }
            }
            Ok(())
        };

        for trigger in &self.triggers {
            check(trigger, "triggers")?;
        }

        let mut groups = HashSet::new();
        for group in &self.groups {
            if !groups.insert(group.name.as_str()) {
                return Err(ConfigError::DuplicateGroup(group.name.clone()));
            }
            for trigger in &group.triggers {
                check(trigger, &format!("group {}", group.name))?;
            }
        }

        Ok(())
    }

    /// Create a simulated item for every declared item
    pub fn build_items(&self) -> ConfigResult<ItemRegistry> {
        let registry = ItemRegistry::new();
        for item in &self.items {
            let id: ItemId = item.id.parse().map_err(|e: hydro_core::ItemIdError| {
                ConfigError::InvalidValue {
                    key: format!("items.{}", item.id),
                    reason: e.to_string(),
                }
            })?;
            let mut simulated = SimulatedItem::new(id, item.state.clone());
            if let Some(states) = &item.states {
                simulated = simulated.with_allowed_states(states.iter().cloned());
            }
            if registry.insert(Arc::new(simulated)).is_some() {
                return Err(ConfigError::DuplicateItem(item.id.clone()));
            }
        }
        Ok(registry)
    }
}
