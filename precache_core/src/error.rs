//! Error types for Precache Core

use thiserror::Error;

/// Result type for Precache operations
pub type Result<T> = std::result::Result<T, PrecacheError>;

/// Errors that can occur while gating, capturing or emitting
#[derive(Error, Debug)]
pub enum PrecacheError {
    /// The phase oracle gave no usable answer
    #[error("Gate misconfiguration: {0}")]
    GateMisconfiguration(String),

    /// A capture scope tried to arm while another thread holds the monitor
    #[error("Reentrancy violation: capture for unit {unit} attempted while a scope is armed on another thread")]
    ReentrancyViolation { unit: String },

    /// The directive sink rejected a captured set
    #[error("Emission failed for artifact {artifact}: {message}")]
    EmissionFailed { artifact: String, message: String },

    /// A preference document failed validation
    #[error("Preference error at {path}: {message}")]
    PreferenceError { path: String, message: String },

    /// No registered method accepts the runtime argument types
    #[error("No method matching {routine}({})", .arg_types.join(", "))]
    NoMatchingMethod {
        routine: String,
        arg_types: Vec<String>,
    },

    /// Failure raised by workload code
    #[error("Workload error: {0}")]
    WorkloadError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
