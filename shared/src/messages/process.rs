//! Backend process lifecycle types
//!
//! Snapshots of the supervised backend. The supervisor is the only writer;
//! everyone else receives clones.

use serde::{Deserialize, Serialize};

/// The backend always binds to loopback
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Lifecycle status of the supervised backend
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BackendStatus {
    NotStarted,
    Starting,
    Running,
    Exited,
    FailedToStart,
}

impl BackendStatus {
    /// A live handle blocks creation of a new one
    pub fn is_live(self) -> bool {
        matches!(self, BackendStatus::Starting | BackendStatus::Running)
    }

    /// Terminal states allow a fresh launch
    pub fn is_terminal(self) -> bool {
        matches!(self, BackendStatus::Exited | BackendStatus::FailedToStart)
    }
}

/// Snapshot of the supervised backend process
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendProcessHandle {
    /// Launch counter; every `start` that creates a handle bumps it
    pub generation: u64,
    pub pid: Option<u32>,
    pub port: Option<u16>,
    pub host: String,
    pub status: BackendStatus,
    pub exit_code: Option<i32>,
}

impl BackendProcessHandle {
    /// Handle state before any launch attempt
    pub fn not_started() -> Self {
        Self {
            generation: 0,
            pid: None,
            port: None,
            host: LOOPBACK_HOST.to_string(),
            status: BackendStatus::NotStarted,
            exit_code: None,
        }
    }

    /// Base URL the gateway uses, if a port has been assigned
    pub fn base_url(&self) -> Option<String> {
        self.port.map(|port| format!("http://{}:{}", self.host, port))
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

impl Default for BackendProcessHandle {
    fn default() -> Self {
        Self::not_started()
    }
}
