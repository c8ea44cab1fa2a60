//! YAML loader with custom tag support
//!
//! Supported tags:
//! - `!include path` - Replace the node with another YAML file (relative to the including file)
//! - `!env_var VAR` - Environment variable substitution; `!env_var VAR default` falls back to `default`

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader that resolves `!include` and `!env_var`
#[derive(Debug)]
pub struct YamlLoader {
    /// Base directory for resolving relative paths
    config_dir: PathBuf,
    /// Track included files to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    let processed_value = self.process_value(v, source_path)?;
                    result.insert(k, processed_value);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        let value = tagged.value;

        trace!("Processing tag '{}' with value {:?}", tag, value);

        match tag.as_str() {
            "!include" => {
                let include_path = self.value_to_path(&value, source_path)?;
                debug!("Including file: {:?}", include_path);
                self.load_file(&include_path)
            }
            "!env_var" => process_env_var(value),
            _ => {
                // Unknown tag, keep it but process the inner value
                let processed = self.process_value(value, source_path)?;
                Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                    tag: tagged.tag,
                    value: processed,
                })))
            }
        }
    }

    /// Convert a YAML value to a path, resolving relative to the source file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let path_str = match value {
            Value::String(s) => s.clone(),
            _ => {
                return Err(ConfigError::InvalidIncludePath {
                    path: format!("{:?}", value),
                    reason: "path must be a string".to_string(),
                })
            }
        };

        let base_dir = source_path.parent().unwrap_or(&self.config_dir);
        if Path::new(&path_str).is_absolute() {
            Ok(PathBuf::from(&path_str))
        } else {
            Ok(base_dir.join(&path_str))
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn process_env_var(value: Value) -> ConfigResult<Value> {
    let spec = match value {
        Value::String(s) => s,
        _ => {
            return Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "environment variable name must be a string".to_string(),
            })
        }
    };

    let (var_name, default) = match spec.split_once(char::is_whitespace) {
        Some((name, default)) => (name.to_string(), Some(default.trim().to_string())),
        None => (spec, None),
    };

    match (std::env::var(&var_name), default) {
        (Ok(env_value), _) => {
            debug!("Substituted env var: {}", var_name);
            Ok(Value::String(env_value))
        }
        (Err(_), Some(default)) => {
            debug!("Env var {} not set, using default", var_name);
            Ok(Value::String(default))
        }
        (Err(_), None) => Err(ConfigError::EnvVarNotFound { var: var_name }),
    }
}

/// Load a YAML file with tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir).load_file(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        value
            .as_mapping()
            .unwrap()
            .get(Value::String(key.to_string()))
            .unwrap()
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "beds/bed_1.yaml", "name: bed_1\ntriggers: []\n");
        write_file(
            dir.path(),
            "hydro.yaml",
            "name: greenhouse\ngroups:\n  - !include beds/bed_1.yaml\n",
        );

        let value = load_yaml(dir.path(), "hydro.yaml").unwrap();
        let groups = get(&value, "groups").as_sequence().unwrap();
        assert_eq!(get(&groups[0], "name"), &Value::String("bed_1".to_string()));
    }

    #[test]
    fn test_env_var_with_default() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("TEST_HYDRO_DEVICE", "/dev/ttyACM0");
        std::env::remove_var("TEST_HYDRO_UNSET");
        write_file(
            dir.path(),
            "hydro.yaml",
            "device: !env_var TEST_HYDRO_DEVICE\nname: !env_var TEST_HYDRO_UNSET greenhouse\n",
        );

        let value = load_yaml(dir.path(), "hydro.yaml").unwrap();
        assert_eq!(get(&value, "device"), &Value::String("/dev/ttyACM0".to_string()));
        assert_eq!(get(&value, "name"), &Value::String("greenhouse".to_string()));

        std::env::remove_var("TEST_HYDRO_DEVICE");
    }

    #[test]
    fn test_missing_env_var() {
        let dir = TempDir::new().unwrap();
        std::env::remove_var("TEST_HYDRO_MISSING");
        write_file(dir.path(), "hydro.yaml", "name: !env_var TEST_HYDRO_MISSING\n");

        assert!(matches!(
            load_yaml(dir.path(), "hydro.yaml"),
            Err(ConfigError::EnvVarNotFound { ref var }) if var == "TEST_HYDRO_MISSING"
        ));
    }

    #[test]
    fn test_circular_include_detection() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write_file(dir.path(), "b.yaml", "a: !include a.yaml\n");

        assert!(matches!(
            load_yaml(dir.path(), "a.yaml"),
            Err(ConfigError::CircularInclude { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_yaml(dir.path(), "absent.yaml"),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
