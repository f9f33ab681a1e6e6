//! Configuration and input validation errors
//!
//! The trajectory integrator itself never fails: numerical degeneracy is clamped
//! and runaway trajectories end with a [`crate::RemovalReason`]. Errors only arise
//! when loading or validating configuration, grids and sources up front.

/// Errors that can occur while loading or validating model input
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to read or write a configuration file
    Io(String),
    /// Failed to parse or serialize configuration contents
    Parse(String),
    /// A parameter is outside its valid range
    Invalid {
        /// Name of the offending parameter
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

impl ConfigError {
    /// Create an `Invalid` error for `field`
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Failed to access configuration: {msg}"),
            ConfigError::Parse(msg) => write!(f, "Failed to parse configuration: {msg}"),
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid parameter '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
