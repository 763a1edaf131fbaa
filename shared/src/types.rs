//! Core identifiers used throughout the shell

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Fallback used before `init_*` runs (unit tests, early startup)
static DEFAULT_PROCESS_ID: ProcessId = ProcessId::Shell;

/// Identifies which side of the shell a log line or event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessId {
    /// The shell process itself
    Shell,
    /// The supervised backend service (used when forwarding its output)
    Backend,
}

impl ProcessId {
    /// Initialize the global process ID for the shell
    pub fn init_shell() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Shell)
    }

    /// Get the global process ID, falling back to `Shell` when uninitialized
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get().unwrap_or(&DEFAULT_PROCESS_ID)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Shell => write!(f, "shell"),
            ProcessId::Backend => write!(f, "backend"),
        }
    }
}
