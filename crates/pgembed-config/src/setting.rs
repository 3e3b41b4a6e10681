//! Single `postgresql.conf` override.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A configuration key and the value it should carry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Setting {
    key: String,
    value: String,
}

impl Setting {
    /// Builds a setting from its parts.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Configuration key, e.g. `shared_preload_libraries`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unquoted value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Renders the line appended to `postgresql.conf`: `key = 'value'`.
    ///
    /// Single quotes inside the value are doubled.
    #[must_use]
    pub fn to_conf_line(&self) -> String {
        format!("{} = '{}'", self.key, self.value.replace('\'', "''"))
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}={}", self.key, self.value)
    }
}

impl FromStr for Setting {
    type Err = SettingParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some((raw_key, raw_value)) = input.split_once('=') else {
            return Err(SettingParseError::MissingSeparator(input.to_owned()));
        };
        let key = raw_key.trim();
        if key.is_empty()
            || !key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
        {
            return Err(SettingParseError::InvalidKey(key.to_owned()));
        }
        let value = raw_value.trim().trim_matches('\'');
        Ok(Self::new(key, value))
    }
}

/// Errors raised while parsing `key=value` overrides.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingParseError {
    /// The entry had no `=`.
    #[error("setting '{0}' is not of the form key=value")]
    MissingSeparator(String),
    /// The key contained characters `postgresql.conf` does not accept.
    #[error("invalid setting key '{0}'")]
    InvalidKey(String),
}
