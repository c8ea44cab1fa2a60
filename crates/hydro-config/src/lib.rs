//! YAML configuration for hydro controllers
//!
//! A configuration declares the items a controller drives, its triggers and
//! trigger groups, and its timing. Files may use two custom tags:
//!
//! - `!include path` - Replace the node with another YAML file
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use hydro_config::ControllerConfig;
//!
//! let config = ControllerConfig::load("hydro.yaml")?;
//! let items = config.build_items()?;
//! ```

mod controller_config;
mod error;
mod loader;

pub use controller_config::{ControllerConfig, GroupConfig, Hms, ItemConfig, TriggerConfig};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};

/// Load and validate a controller configuration file
pub fn load_config(path: impl AsRef<std::path::Path>) -> ConfigResult<ControllerConfig> {
    ControllerConfig::load(path)
}

/// Parse and validate a controller configuration from a string
pub fn parse_config(content: &str) -> ConfigResult<ControllerConfig> {
    ControllerConfig::parse(content)
}
