//! `HH:MM:SS` durations
//!
//! Windows and poll intervals are written the way the hardware schedules
//! are usually noted down: `"00:01:00"`, `"05:00"`, `"30"`. Configuration may
//! also give a plain (possibly fractional) number of seconds.

use std::time::Duration;
use thiserror::Error;

/// Error parsing an `HH:MM:SS` duration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HmsError {
    #[error("invalid {field} in duration '{input}'")]
    InvalidField { field: &'static str, input: String },

    #[error("invalid duration format '{0}' (expected HH:MM:SS, MM:SS or SS)")]
    InvalidFormat(String),

    #[error("duration must be a non-negative finite number of seconds, got {0}")]
    InvalidSeconds(String),
}

/// Parse `HH:MM:SS`, `MM:SS` or `SS`
pub fn parse_hms(s: &str) -> Result<Duration, HmsError> {
    let field = |name: &'static str, part: &str| -> Result<u64, HmsError> {
        part.trim().parse().map_err(|_| HmsError::InvalidField {
            field: name,
            input: s.to_string(),
        })
    };

    let parts: Vec<&str> = s.split(':').collect();
    let secs = match parts.as_slice() {
        [secs] => field("seconds", secs)?,
        [mins, secs] => field("minutes", mins)? * 60 + field("seconds", secs)?,
        [hours, mins, secs] => {
            field("hours", hours)? * 3600 + field("minutes", mins)? * 60 + field("seconds", secs)?
        }
        _ => return Err(HmsError::InvalidFormat(s.to_string())),
    };
    Ok(Duration::from_secs(secs))
}

/// Format whole seconds as `HH:MM:SS`
pub fn format_hms(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Convert a number of seconds, rejecting negative and non-finite values
pub fn from_secs_f64(secs: f64) -> Result<Duration, HmsError> {
    Duration::try_from_secs_f64(secs).map_err(|_| HmsError::InvalidSeconds(secs.to_string()))
}

/// Serde adapter: accepts `"HH:MM:SS"` strings or numbers of seconds, writes `"HH:MM:SS"`
pub mod duration_hms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
    }

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_hms(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => super::from_secs_f64(secs).map_err(serde::de::Error::custom),
            Raw::Text(s) => super::parse_hms(&s).map_err(serde::de::Error::custom),
        }
    }
}
