// ABOUTME: Validated name for a saved run configuration.
// ABOUTME: Names double as image tag suffixes, so they follow image name rules.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigNameError {
    #[error("configuration name cannot be empty")]
    Empty,

    #[error("configuration name exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("configuration name must start with a letter or digit")]
    BadStart,

    #[error("configuration name must be lowercase")]
    NotLowercase,

    #[error("invalid character in configuration name: '{0}'")]
    InvalidChar(char),
}

/// Name of a named configuration, e.g. `my-app`.
///
/// The name ends up in the image tag `box-named-<name>`, so only lowercase
/// alphanumerics plus `-`, `_` and `.` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigName(String);

impl ConfigName {
    pub fn new(value: &str) -> Result<Self, ConfigNameError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigNameError::Empty);
        }

        if value.len() > MAX_LEN {
            return Err(ConfigNameError::TooLong);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(ConfigNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && !matches!(c, '-' | '_' | '.') {
                return Err(ConfigNameError::InvalidChar(c));
            }
        }

        if !value.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(ConfigNameError::BadStart);
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ConfigName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConfigName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ConfigName::new(&s).map_err(serde::de::Error::custom)
    }
}
