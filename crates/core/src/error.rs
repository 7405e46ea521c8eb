use thiserror::Error;

/// Errors from the shared configuration layer.
#[derive(Debug, Error)]
pub enum CoachError {
    /// An environment variable was set to a value that does not parse.
    #[error("invalid value '{value}' for {key}: {message}")]
    Config {
        key: String,
        value: String,
        message: String,
    },
}
