//! Update orchestration
//!
//! Drives `UpdateMachine` with feed, transport and installer results and
//! pushes every resulting snapshot to subscribers. All transitions happen
//! under one lock and are published before it is released, so observers see
//! them in order.

use shared::{
    logging, process_debug, process_info, process_warn, ProcessId, PromptAction, UpdateSession,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::config::ShellConfig;
use crate::core::{QuitReason, ShellEvent, StatusBroadcaster, Subscription, UpdateEvent, UpdateMachine};
use crate::error::{ShellError, ShellResult};
use crate::services::update_feed::is_newer;
use crate::traits::{FeedRelease, Installer, UpdateFeed};

/// Download state that must outlive a single transition
#[derive(Default)]
struct Staging {
    release: Option<FeedRelease>,
    artifact: Option<PathBuf>,
}

#[derive(Clone)]
pub struct Updater {
    machine: Arc<Mutex<UpdateMachine>>,
    staging: Arc<Mutex<Staging>>,
    broadcaster: Arc<StatusBroadcaster<UpdateSession>>,
    feed: Arc<dyn UpdateFeed>,
    installer: Arc<dyn Installer>,
    current_version: String,
    enabled: bool,
    events: Option<mpsc::UnboundedSender<ShellEvent>>,
}

impl Updater {
    pub fn new(feed: Arc<dyn UpdateFeed>, installer: Arc<dyn Installer>, current_version: impl Into<String>) -> Self {
        Self {
            machine: Arc::new(Mutex::new(UpdateMachine::new())),
            staging: Arc::new(Mutex::new(Staging::default())),
            broadcaster: Arc::new(StatusBroadcaster::new()),
            feed,
            installer,
            current_version: current_version.into(),
            enabled: true,
            events: None,
        }
    }

    pub fn from_config(config: &ShellConfig, feed: Arc<dyn UpdateFeed>, installer: Arc<dyn Installer>) -> Self {
        Self::new(feed, installer, config.feed.current_version.clone()).with_enabled(!config.dev_mode)
    }

    /// Dev builds never update (fluent API)
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Where to send `Quit` after a successful install (fluent API)
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ShellEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn snapshot(&self) -> UpdateSession {
        self.machine.lock().await.snapshot()
    }

    /// Receive every subsequent snapshot until the subscription is cancelled
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&UpdateSession) + Send + Sync + 'static,
    {
        self.broadcaster.subscribe(observer)
    }

    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<UpdateSession>) {
        self.broadcaster.subscribe_channel()
    }

    /// Current snapshot plus a channel of every later transition.
    ///
    /// Both are taken under the machine lock, so a transition shows up either
    /// in the snapshot or on the channel, never both.
    pub async fn snapshot_and_subscribe(&self) -> (UpdateSession, Subscription, mpsc::UnboundedReceiver<UpdateSession>) {
        let machine = self.machine.lock().await;
        let (subscription, rx) = self.broadcaster.subscribe_channel();
        (machine.snapshot(), subscription, rx)
    }

    /// Apply one event and publish the transition while still holding the lock
    async fn transition(&self, event: UpdateEvent) -> ShellResult<UpdateSession> {
        let mut machine = self.machine.lock().await;
        match machine.apply(event)? {
            Some(session) => {
                process_debug!(ProcessId::current(), "Update status -> {} ({})", session.status, session.message);
                self.broadcaster.publish(&session);
                Ok(session)
            }
            None => Ok(machine.snapshot()),
        }
    }

    /// Query the feed unless a session is already in flight
    pub async fn check_for_update(&self) -> UpdateSession {
        if !self.enabled {
            process_info!(ProcessId::current(), "Update check skipped in development mode");
            return self.snapshot().await;
        }

        {
            let mut machine = self.machine.lock().await;
            match machine.apply(UpdateEvent::CheckRequested) {
                Ok(Some(session)) => self.broadcaster.publish(&session),
                // already checking or an update is under way
                Ok(None) | Err(_) => return machine.snapshot(),
            };
        }

        let event = match self.feed.latest().await {
            Ok(release) => match is_newer(&release.info.version, &self.current_version) {
                Ok(true) => {
                    let info = release.info.clone();
                    self.staging.lock().await.release = Some(release);
                    UpdateEvent::FeedNewer(info)
                }
                Ok(false) => UpdateEvent::FeedCurrent {
                    latest: release.info.version,
                },
                Err(e) => UpdateEvent::FeedFailed(e.to_string()),
            },
            Err(e) => {
                logging::log_error(ProcessId::current(), "Update check", &e);
                UpdateEvent::FeedFailed(e.to_string())
            }
        };

        match self.transition(event).await {
            Ok(session) => session,
            Err(e) => {
                process_warn!(ProcessId::current(), "Dropping feed result: {}", e);
                self.snapshot().await
            }
        }
    }

    /// Answer an "update available" prompt
    pub async fn respond_to_prompt(&self, action: PromptAction) -> ShellResult<UpdateSession> {
        match action {
            PromptAction::Cancel => {
                let session = self.transition(UpdateEvent::DownloadDeclined).await?;
                self.staging.lock().await.release = None;
                Ok(session)
            }
            PromptAction::Download => {
                let session = self.transition(UpdateEvent::DownloadAccepted).await?;
                match self.staging.lock().await.release.clone() {
                    Some(release) => {
                        let updater = self.clone();
                        tokio::spawn(async move { updater.run_download(release).await });
                        Ok(session)
                    }
                    None => self.transition(UpdateEvent::DownloadFailed("no release staged".to_string())).await,
                }
            }
        }
    }

    async fn run_download(&self, release: FeedRelease) {
        logging::log_progress(ProcessId::current(), "Downloading update", &release.info.version);

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let download = self.feed.download(&release, progress_tx);
        tokio::pin!(download);

        let result = loop {
            tokio::select! {
                biased;
                Some(percent) = progress_rx.recv() => {
                    let _ = self.transition(UpdateEvent::Progress(percent)).await;
                }
                result = &mut download => break result,
            }
        };
        while let Ok(percent) = progress_rx.try_recv() {
            let _ = self.transition(UpdateEvent::Progress(percent)).await;
        }

        let event = match result {
            Ok(path) => {
                self.staging.lock().await.artifact = Some(path);
                UpdateEvent::Downloaded
            }
            Err(e) => {
                logging::log_error(ProcessId::current(), "Update download", &e);
                UpdateEvent::DownloadFailed(e.to_string())
            }
        };
        if let Err(e) = self.transition(event).await {
            process_warn!(ProcessId::current(), "Dropping download result: {}", e);
        }
    }

    /// Apply the downloaded update and ask the shell to quit
    pub async fn install_now(&self) -> ShellResult<UpdateSession> {
        if !self.machine.lock().await.begin_install()? {
            return Ok(self.snapshot().await);
        }

        let artifact = self.staging.lock().await.artifact.clone();
        let outcome = match artifact {
            Some(path) => self.installer.install(&path).await,
            None => Err(ShellError::install("no downloaded artifact")),
        };

        match outcome {
            Ok(()) => {
                logging::log_success(ProcessId::current(), "Update installed, restarting");
                if let Some(events) = &self.events {
                    let _ = events.send(ShellEvent::Quit(QuitReason::UpdateInstalled));
                }
                Ok(self.snapshot().await)
            }
            Err(e) => {
                logging::log_error(ProcessId::current(), "Update install", &e);
                self.transition(UpdateEvent::InstallFailed(e.to_string())).await
            }
        }
    }

    /// Silent check after `delay`, for application startup
    pub fn schedule_check(&self, delay: Duration) {
        let updater = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let session = updater.check_for_update().await;
            process_debug!(ProcessId::current(), "Startup update check: {}", session.status);
        });
    }
}
