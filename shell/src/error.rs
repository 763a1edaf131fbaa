//! Shell-specific error types

use shared::SharedError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("No free local port available")]
    PortExhaustion,

    #[error("Backend executable not found: {}", path.display())]
    ExecutableNotFound { path: PathBuf },

    #[error("Failed to spawn backend process: {message}")]
    ProcessSpawn { message: String },

    #[error("Backend transport error: {message}")]
    Transport { message: String },

    #[error("Update feed query failed: {message}")]
    FeedQuery { message: String },

    #[error("Update download failed: {message}")]
    Download { message: String },

    #[error("Update install failed: {message}")]
    Install { message: String },

    #[error("Cannot {request} while update status is {status}")]
    InvalidTransition { status: String, request: String },

    #[error("Another shell instance is already running")]
    InstanceLocked,

    #[error("Window surface error: {message}")]
    Surface { message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Bridge server error: {message}")]
    Bridge { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ShellError {
    pub fn config(field: impl Into<String>) -> Self {
        ShellError::ConfigurationError { field: field.into() }
    }

    pub fn spawn(message: impl Into<String>) -> Self {
        ShellError::ProcessSpawn {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ShellError::Transport {
            message: message.into(),
        }
    }

    pub fn feed(message: impl Into<String>) -> Self {
        ShellError::FeedQuery {
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        ShellError::Download {
            message: message.into(),
        }
    }

    pub fn install(message: impl Into<String>) -> Self {
        ShellError::Install {
            message: message.into(),
        }
    }

    pub fn surface(message: impl Into<String>) -> Self {
        ShellError::Surface {
            message: message.into(),
        }
    }

    pub fn bridge(message: impl Into<String>) -> Self {
        ShellError::Bridge {
            message: message.into(),
        }
    }
}

pub type ShellResult<T> = Result<T, ShellError>;
