//! Shared error types for the desktop shell

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethod { method: String },

    #[error("Unknown prompt action: {action}")]
    UnknownPromptAction { action: String },

    #[error("Serialization failed: {message}")]
    SerializationError { message: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
