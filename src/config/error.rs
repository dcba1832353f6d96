//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    /// Kept with the file contents so the error can be shown in a code frame.
    #[error("Config file parsing error: {}", .source.message())]
    Toml {
        path: PathBuf,
        contents: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(
        "Invalid value for `{key}`: {value:?}\nExpected one of: {}",
        .allowed.join(", ")
    )]
    InvalidValue {
        key: &'static str,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Config validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Build an [`ConfigError::InvalidValue`] with the allowed values sorted.
    pub fn invalid_value(key: &'static str, value: &str, allowed: &[&str]) -> Self {
        let mut allowed: Vec<String> = allowed.iter().map(|s| (*s).to_owned()).collect();
        allowed.sort();
        Self::InvalidValue {
            key,
            value: value.to_owned(),
            allowed,
        }
    }
}
