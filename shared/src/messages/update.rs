//! Update session snapshots
//!
//! The updater publishes one `UpdateSession` per transition. Presentation
//! layers only read these; they request transitions through the update
//! contract (`PromptAction` among others).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SharedError;

/// Version metadata of a candidate release, exactly as the feed supplied it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub version: String,
    pub release_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

/// Status of the current update session, with the data each state carries
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum UpdateStatus {
    Idle,
    Checking,
    #[serde(rename_all = "camelCase")]
    UpdateAvailable { version_info: ReleaseInfo },
    Downloading { progress: u8 },
    #[serde(rename_all = "camelCase")]
    Ready { version_info: ReleaseInfo },
    UpToDate,
    Error { error: String },
}

impl UpdateStatus {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateStatus::Idle => "idle",
            UpdateStatus::Checking => "checking",
            UpdateStatus::UpdateAvailable { .. } => "update-available",
            UpdateStatus::Downloading { .. } => "downloading",
            UpdateStatus::Ready { .. } => "ready",
            UpdateStatus::UpToDate => "up-to-date",
            UpdateStatus::Error { .. } => "error",
        }
    }

    pub fn version_info(&self) -> Option<&ReleaseInfo> {
        match self {
            UpdateStatus::UpdateAvailable { version_info } | UpdateStatus::Ready { version_info } => {
                Some(version_info)
            }
            _ => None,
        }
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            UpdateStatus::Downloading { progress } => Some(*progress),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable snapshot delivered to observers on every transition
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSession {
    /// Bumped each time a fresh check supersedes the previous session
    pub session_id: u64,
    #[serde(flatten)]
    pub status: UpdateStatus,
    pub message: String,
}

impl UpdateSession {
    pub fn idle() -> Self {
        Self {
            session_id: 0,
            status: UpdateStatus::Idle,
            message: String::new(),
        }
    }
}

/// User answer to an "update available" prompt
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptAction {
    Download,
    Cancel,
}

impl FromStr for PromptAction {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(PromptAction::Download),
            "cancel" | "later" => Ok(PromptAction::Cancel),
            _ => Err(SharedError::UnknownPromptAction {
                action: s.to_string(),
            }),
        }
    }
}
