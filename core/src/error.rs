//! Error types for streambench-core

use thiserror::Error;

use crate::pool::PoolState;

/// Core error type
#[derive(Error, Debug)]
pub enum BenchError {
    /// A configuration field is outside its accepted range
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig {
        /// Name of the offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// A required builder input was never supplied
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    /// Profile name is neither built in nor discoverable
    #[error("unknown profile `{0}`")]
    UnknownProfile(String),

    /// A profile definition or configuration file could not be read or parsed
    #[error("failed to load profile source {path}: {reason}")]
    ProfileSource {
        /// File that failed to load
        path: String,
        /// Underlying IO or parse error
        reason: String,
    },

    /// Control operation issued in a state that does not permit it
    #[error("cannot {action} while pool is {state}")]
    InvalidState {
        /// Attempted control operation
        action: &'static str,
        /// State observed at the time of the call
        state: PoolState,
    },

    /// Snapshot export failure
    #[error("export error: {0}")]
    Export(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Build an [`BenchError::InvalidConfig`] for `field`
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Build a [`BenchError::MissingConfig`]
    pub fn missing_config(what: &'static str) -> Self {
        Self::MissingConfig(what)
    }

    /// Name of the offending configuration field, if this is a configuration error
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidConfig { field, .. } => Some(field),
            _ => None,
        }
    }

    /// True for errors raised before any worker could be created
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig(_)
                | Self::UnknownProfile(_)
                | Self::ProfileSource { .. }
        )
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
