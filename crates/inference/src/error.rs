//! Error types for the inference engine.

use thiserror::Error;

/// Errors that can occur during fact resolution, rule evaluation,
/// and rule loading.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// A condition referenced a fact that is neither a static fact nor a
    /// registered dynamic fact (strict mode only).
    #[error("unknown fact: '{0}'")]
    UnknownFact(String),

    /// A condition referenced an operator missing from the registry.
    #[error("unknown operator: '{0}'")]
    UnknownOperator(String),

    /// A dynamic fact resolver failed.
    #[error("resolver for fact '{fact}' failed: {message}")]
    Resolver { fact: String, message: String },

    /// Rule definitions failed construction-time validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
