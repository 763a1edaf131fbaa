//! Update session state machine
//!
//! Pure transition logic with no I/O, so every edge of the machine can be
//! tested directly. The async `Updater` drives it and publishes the
//! snapshots it returns.

use shared::{ReleaseInfo, UpdateSession, UpdateStatus};

use crate::error::{ShellError, ShellResult};

/// Inputs to the machine: user requests and feed/transport outcomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    CheckRequested,
    FeedNewer(ReleaseInfo),
    FeedCurrent { latest: String },
    FeedFailed(String),
    DownloadAccepted,
    DownloadDeclined,
    Progress(u8),
    Downloaded,
    DownloadFailed(String),
    InstallFailed(String),
}

impl UpdateEvent {
    fn request_name(&self) -> &'static str {
        match self {
            UpdateEvent::CheckRequested => "check for updates",
            UpdateEvent::FeedNewer(_) | UpdateEvent::FeedCurrent { .. } | UpdateEvent::FeedFailed(_) => {
                "accept a feed response"
            }
            UpdateEvent::DownloadAccepted => "start a download",
            UpdateEvent::DownloadDeclined => "decline an update",
            UpdateEvent::Progress(_) => "record download progress",
            UpdateEvent::Downloaded | UpdateEvent::DownloadFailed(_) => "finish a download",
            UpdateEvent::InstallFailed(_) => "report an install failure",
        }
    }
}

/// Owns the current session; the only place status is written
#[derive(Debug, Clone)]
pub struct UpdateMachine {
    session: UpdateSession,
    /// Release being offered/downloaded; outlives the `downloading` snapshot
    candidate: Option<ReleaseInfo>,
    installing: bool,
}

impl UpdateMachine {
    pub fn new() -> Self {
        Self {
            session: UpdateSession::idle(),
            candidate: None,
            installing: false,
        }
    }

    pub fn snapshot(&self) -> UpdateSession {
        self.session.clone()
    }

    pub fn status(&self) -> &UpdateStatus {
        &self.session.status
    }

    pub fn candidate(&self) -> Option<&ReleaseInfo> {
        self.candidate.as_ref()
    }

    /// Apply an event.
    ///
    /// `Ok(Some(_))` is a transition to publish, `Ok(None)` a no-op (a check
    /// while one is in flight, a progress tick that does not advance),
    /// `Err` a request the current state does not accept.
    pub fn apply(&mut self, event: UpdateEvent) -> ShellResult<Option<UpdateSession>> {
        let next = match (&self.session.status, &event) {
            (UpdateStatus::Idle | UpdateStatus::UpToDate | UpdateStatus::Error { .. }, UpdateEvent::CheckRequested) => {
                self.session.session_id += 1;
                self.candidate = None;
                self.installing = false;
                Some((UpdateStatus::Checking, "Checking for updates...".to_string()))
            }
            (
                UpdateStatus::Checking
                | UpdateStatus::UpdateAvailable { .. }
                | UpdateStatus::Downloading { .. }
                | UpdateStatus::Ready { .. },
                UpdateEvent::CheckRequested,
            ) => None,

            (UpdateStatus::Checking, UpdateEvent::FeedNewer(info)) => {
                self.candidate = Some(info.clone());
                let message = format!("New version {} available", info.version);
                Some((
                    UpdateStatus::UpdateAvailable {
                        version_info: info.clone(),
                    },
                    message,
                ))
            }
            (UpdateStatus::Checking, UpdateEvent::FeedCurrent { latest }) => Some((
                UpdateStatus::UpToDate,
                format!("Already on the latest version ({latest})"),
            )),
            (UpdateStatus::Checking, UpdateEvent::FeedFailed(error)) => Some((
                UpdateStatus::Error { error: error.clone() },
                format!("Update check failed: {error}"),
            )),

            (UpdateStatus::UpdateAvailable { version_info }, UpdateEvent::DownloadAccepted) => {
                let message = format!("Downloading version {}...", version_info.version);
                Some((UpdateStatus::Downloading { progress: 0 }, message))
            }
            (UpdateStatus::UpdateAvailable { .. }, UpdateEvent::DownloadDeclined) => {
                self.candidate = None;
                Some((UpdateStatus::UpToDate, "Update postponed".to_string()))
            }

            (UpdateStatus::Downloading { progress }, UpdateEvent::Progress(tick)) => {
                let tick = (*tick).min(100);
                if tick <= *progress {
                    None
                } else {
                    Some((UpdateStatus::Downloading { progress: tick }, format!("Downloading... {tick}%")))
                }
            }
            // late ticks after the download settled
            (_, UpdateEvent::Progress(_)) => None,

            (UpdateStatus::Downloading { .. }, UpdateEvent::Downloaded) => {
                let version_info = self.candidate.clone().ok_or_else(|| self.rejected(&event))?;
                let message = format!("Version {} is ready to install", version_info.version);
                Some((UpdateStatus::Ready { version_info }, message))
            }
            (UpdateStatus::Downloading { .. }, UpdateEvent::DownloadFailed(error)) => Some((
                UpdateStatus::Error { error: error.clone() },
                format!("Update download failed: {error}"),
            )),

            (UpdateStatus::Ready { .. }, UpdateEvent::InstallFailed(error)) => {
                self.installing = false;
                Some((
                    UpdateStatus::Error { error: error.clone() },
                    format!("Update install failed: {error}"),
                ))
            }

            _ => return Err(self.rejected(&event)),
        };

        Ok(next.map(|(status, message)| {
            self.session.status = status;
            self.session.message = message;
            self.session.clone()
        }))
    }

    /// Claim the one-shot install step.
    ///
    /// Returns `true` the first time it is called in `ready`, `false` when an
    /// install is already under way.
    pub fn begin_install(&mut self) -> ShellResult<bool> {
        match self.session.status {
            UpdateStatus::Ready { .. } if self.installing => Ok(false),
            UpdateStatus::Ready { .. } => {
                self.installing = true;
                Ok(true)
            }
            _ => Err(ShellError::InvalidTransition {
                status: self.session.status.name().to_string(),
                request: "install an update".to_string(),
            }),
        }
    }

    fn rejected(&self, event: &UpdateEvent) -> ShellError {
        ShellError::InvalidTransition {
            status: self.session.status.name().to_string(),
            request: event.request_name().to_string(),
        }
    }
}

impl Default for UpdateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(version: &str) -> ReleaseInfo {
        ReleaseInfo {
            version: version.to_string(),
            release_date: "2025-09-07".to_string(),
            release_notes: None,
        }
    }

    fn machine_in_update_available(version: &str) -> UpdateMachine {
        let mut machine = UpdateMachine::new();
        machine.apply(UpdateEvent::CheckRequested).unwrap();
        machine.apply(UpdateEvent::FeedNewer(release(version))).unwrap();
        machine
    }

    #[test]
    fn test_initial_state_is_idle() {
        let machine = UpdateMachine::new();
        assert_eq!(machine.status(), &UpdateStatus::Idle);
        assert_eq!(machine.snapshot().session_id, 0);
    }

    #[test]
    fn test_newer_version_carries_exact_version_then_decline() {
        let mut machine = UpdateMachine::new();
        let checking = machine.apply(UpdateEvent::CheckRequested).unwrap().unwrap();
        assert_eq!(checking.status, UpdateStatus::Checking);

        let available = machine
            .apply(UpdateEvent::FeedNewer(release("v2.0.0-beta.1")))
            .unwrap()
            .unwrap();
        assert_eq!(
            available.status.version_info().map(|info| info.version.as_str()),
            Some("v2.0.0-beta.1")
        );

        let declined = machine.apply(UpdateEvent::DownloadDeclined).unwrap().unwrap();
        assert_eq!(declined.status, UpdateStatus::UpToDate);
        assert!(machine.candidate().is_none());
    }

    #[test]
    fn test_check_while_checking_is_noop() {
        let mut machine = UpdateMachine::new();
        machine.apply(UpdateEvent::CheckRequested).unwrap();
        let session_id = machine.snapshot().session_id;

        assert_eq!(machine.apply(UpdateEvent::CheckRequested).unwrap(), None);
        assert_eq!(machine.snapshot().session_id, session_id);
        assert_eq!(machine.status(), &UpdateStatus::Checking);
    }

    #[test]
    fn test_feed_outcomes_from_checking() {
        let mut machine = UpdateMachine::new();
        machine.apply(UpdateEvent::CheckRequested).unwrap();
        let current = machine
            .apply(UpdateEvent::FeedCurrent {
                latest: "1.0.0".to_string(),
            })
            .unwrap()
            .unwrap();
        assert_eq!(current.status, UpdateStatus::UpToDate);

        machine.apply(UpdateEvent::CheckRequested).unwrap();
        let failed = machine
            .apply(UpdateEvent::FeedFailed("network unreachable".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(
            failed.status,
            UpdateStatus::Error {
                error: "network unreachable".to_string()
            }
        );
    }

    #[test]
    fn test_retry_from_error_starts_fresh_session() {
        let mut machine = UpdateMachine::new();
        machine.apply(UpdateEvent::CheckRequested).unwrap();
        machine.apply(UpdateEvent::FeedFailed("timeout".to_string())).unwrap();
        let first = machine.snapshot().session_id;

        let retry = machine.apply(UpdateEvent::CheckRequested).unwrap().unwrap();
        assert_eq!(retry.status, UpdateStatus::Checking);
        assert_eq!(retry.session_id, first + 1);
    }

    #[test]
    fn test_download_progress_is_monotonic_and_clamped() {
        let mut machine = machine_in_update_available("1.1.0");
        let started = machine.apply(UpdateEvent::DownloadAccepted).unwrap().unwrap();
        assert_eq!(started.status.progress(), Some(0));

        assert!(machine.apply(UpdateEvent::Progress(40)).unwrap().is_some());
        assert_eq!(machine.apply(UpdateEvent::Progress(25)).unwrap(), None);
        assert_eq!(machine.apply(UpdateEvent::Progress(40)).unwrap(), None);
        let clamped = machine.apply(UpdateEvent::Progress(250)).unwrap().unwrap();
        assert_eq!(clamped.status.progress(), Some(100));
    }

    #[test]
    fn test_download_completion_restores_version_metadata() {
        let mut machine = machine_in_update_available("1.1.0");
        machine.apply(UpdateEvent::DownloadAccepted).unwrap();
        let ready = machine.apply(UpdateEvent::Downloaded).unwrap().unwrap();
        assert_eq!(ready.status.version_info().unwrap().version, "1.1.0");

        // late tick after completion
        assert_eq!(machine.apply(UpdateEvent::Progress(100)).unwrap(), None);
    }

    #[test]
    fn test_download_failure_moves_to_error() {
        let mut machine = machine_in_update_available("1.1.0");
        machine.apply(UpdateEvent::DownloadAccepted).unwrap();
        let failed = machine
            .apply(UpdateEvent::DownloadFailed("sha512 mismatch".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(failed.status.name(), "error");
    }

    #[test]
    fn test_invalid_requests_are_rejected() {
        let mut machine = UpdateMachine::new();
        assert!(matches!(
            machine.apply(UpdateEvent::DownloadAccepted),
            Err(ShellError::InvalidTransition { .. })
        ));
        assert!(machine.apply(UpdateEvent::DownloadDeclined).is_err());
        assert!(machine.apply(UpdateEvent::Downloaded).is_err());
        assert!(machine.begin_install().is_err());
        assert_eq!(machine.status(), &UpdateStatus::Idle);
    }

    #[test]
    fn test_install_is_claimed_once() {
        let mut machine = machine_in_update_available("1.1.0");
        machine.apply(UpdateEvent::DownloadAccepted).unwrap();
        machine.apply(UpdateEvent::Downloaded).unwrap();

        assert!(machine.begin_install().unwrap());
        assert!(!machine.begin_install().unwrap());

        let failed = machine
            .apply(UpdateEvent::InstallFailed("permission denied".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(failed.status.name(), "error");
    }

    #[test]
    fn test_check_is_ignored_while_update_in_flight() {
        let mut machine = machine_in_update_available("1.1.0");
        assert_eq!(machine.apply(UpdateEvent::CheckRequested).unwrap(), None);
        machine.apply(UpdateEvent::DownloadAccepted).unwrap();
        assert_eq!(machine.apply(UpdateEvent::CheckRequested).unwrap(), None);
        assert_eq!(machine.status().name(), "downloading");
    }
}
