//! Error types for the localization filter and its I/O helpers

use thiserror::Error;

/// Localization error type
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("particle filter used before initialization")]
    NotInitialized,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("unsupported file extension: {0}")]
    UnsupportedFormat(String),
}

impl From<serde_json::Error> for FilterError {
    fn from(e: serde_json::Error) -> Self {
        FilterError::Format(e.to_string())
    }
}

impl From<serde_yaml::Error> for FilterError {
    fn from(e: serde_yaml::Error) -> Self {
        FilterError::Format(e.to_string())
    }
}

impl From<toml::de::Error> for FilterError {
    fn from(e: toml::de::Error) -> Self {
        FilterError::Format(e.to_string())
    }
}

impl From<toml::ser::Error> for FilterError {
    fn from(e: toml::ser::Error) -> Self {
        FilterError::Format(e.to_string())
    }
}

impl From<rand_distr::NormalError> for FilterError {
    fn from(e: rand_distr::NormalError) -> Self {
        FilterError::InvalidConfig(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
