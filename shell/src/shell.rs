//! Shell event loop
//!
//! Wires the single-instance guard, port allocator, supervisor, window
//! manager and updater together. Components never call each other directly
//! after launch; everything flows through `ShellEvent`s consumed here.

use shared::{logging, process_debug, process_error, process_info, process_warn, BackendProcessHandle, ProcessId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use crate::config::{UiSource, SHELL_RUN_MARKER};
use crate::core::{QuitReason, ShellContext, ShellEvent};
use crate::error::{ShellError, ShellResult};
use crate::services::{Readiness, ReadinessProbe, SingleInstanceGuard};
use crate::traits::{LaunchSpec, PortAllocator, PresentationSurface, ProcessSupervisor};
use crate::updater::Updater;
use crate::window::{AfterClose, WindowManager};

/// Extra time on top of the stop grace for the exit to be observed
const EXIT_OBSERVE_SLACK: Duration = Duration::from_secs(1);

/// Result of the launch sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Another instance holds the lock; nothing was started
    AlreadyRunning,
    /// The window was requested; `backend` is the handle it will talk to
    Started { backend: BackendProcessHandle },
}

/// URL the window loads, carrying the bridge address as a query parameter
pub fn ui_url(ui: &UiSource, bridge_url: Option<&str>) -> ShellResult<Url> {
    let mut url = match ui {
        UiSource::DevServer(url) => url.clone(),
        UiSource::Packaged(_) => {
            let bridge = bridge_url.ok_or_else(|| ShellError::config("packaged UI is served by the bridge"))?;
            Url::parse(bridge).map_err(|e| ShellError::config(format!("bridge url '{bridge}': {e}")))?
        }
    };
    if let Some(bridge) = bridge_url {
        url.query_pairs_mut().append_pair("bridge", bridge);
    }
    Ok(url)
}

pub struct Shell<A, P, S>
where
    A: PortAllocator,
    P: ProcessSupervisor,
    S: PresentationSurface,
{
    context: ShellContext,
    allocator: Arc<A>,
    supervisor: Arc<P>,
    windows: WindowManager<S, P>,
    updater: Updater,
    readiness: ReadinessProbe,
    events_rx: mpsc::UnboundedReceiver<ShellEvent>,
    bridge_url: Option<String>,
}

impl<A, P, S> Shell<A, P, S>
where
    A: PortAllocator,
    P: ProcessSupervisor,
    S: PresentationSurface,
{
    /// `events_rx` must be the receiving end of the context's event sender
    pub fn new(
        context: ShellContext,
        events_rx: mpsc::UnboundedReceiver<ShellEvent>,
        allocator: Arc<A>,
        supervisor: Arc<P>,
        surface: Arc<S>,
        updater: Updater,
    ) -> ShellResult<Self> {
        let config = context.config();
        let readiness = ReadinessProbe::new(config.readiness.clone())?;
        let windows = WindowManager::new(surface, supervisor.clone(), config.quit_when_windows_closed);

        Ok(Self {
            context,
            allocator,
            supervisor,
            windows,
            updater,
            readiness,
            events_rx,
            bridge_url: None,
        })
    }

    /// Address of the presentation bridge, passed to the UI
    pub fn with_bridge_url(mut self, bridge_url: impl Into<String>) -> Self {
        self.bridge_url = Some(bridge_url.into());
        self
    }

    pub fn context(&self) -> &ShellContext {
        &self.context
    }

    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    pub fn windows(&self) -> &WindowManager<S, P> {
        &self.windows
    }

    /// Startup sequence: claim the instance lock, launch the backend on a
    /// fresh port, wait for readiness and open the window.
    ///
    /// The window opens even when the backend could not be brought up; the UI
    /// then runs degraded and every gateway call reports the failure.
    pub async fn launch(&mut self, guard: &mut SingleInstanceGuard) -> ShellResult<LaunchOutcome> {
        if !guard.is_held() && !guard.acquire()? {
            process_info!(ProcessId::current(), "Another instance is already running");
            return Ok(LaunchOutcome::AlreadyRunning);
        }

        let backend = self.start_backend().await;
        let url = ui_url(&self.context.config().ui, self.bridge_url.as_deref())?;

        process_info!(ProcessId::current(), "🪟 Opening window at {}", url);
        if let Err(e) = self.windows.open(url.as_str()).await {
            logging::log_error(ProcessId::current(), "Opening window", &e);
        }

        Ok(LaunchOutcome::Started { backend })
    }

    async fn start_backend(&self) -> BackendProcessHandle {
        let port = match self.allocator.allocate() {
            Ok(port) => port,
            Err(e) => {
                logging::log_error(ProcessId::current(), "Port allocation", &e);
                process_warn!(ProcessId::current(), "Continuing without a backend");
                return self.supervisor.current();
            }
        };

        let launch = &self.context.config().backend;
        let spec = LaunchSpec {
            executable: launch.executable.clone(),
            args: launch.args.clone(),
            working_dir: launch.working_dir.clone(),
            env: vec![(SHELL_RUN_MARKER.0.to_string(), SHELL_RUN_MARKER.1.to_string())],
            port,
        };

        let handle = self.supervisor.start(spec).await;
        if !handle.is_live() {
            process_warn!(ProcessId::current(), "Backend did not start ({:?})", handle.status);
            return handle;
        }

        let backend = self.context.backend_watch();
        match self.readiness.wait_ready(&backend, handle.generation).await {
            Readiness::Ready { attempts } => {
                logging::log_success(
                    ProcessId::current(),
                    &format!("Backend ready on port {port} after {attempts} probe(s)"),
                );
            }
            Readiness::Exhausted { attempts } => {
                let reason = format!("backend not ready after {attempts} probe(s)");
                process_error!(ProcessId::current(), "❌ {}", reason);
                if let Err(e) = self.supervisor.mark_failed(&handle, &reason).await {
                    logging::log_error(ProcessId::current(), "Marking backend failed", &e);
                }
            }
            Readiness::BackendGone => {
                process_warn!(ProcessId::current(), "Backend exited before becoming ready");
            }
        }

        self.supervisor.current()
    }

    /// Process events until something asks the shell to quit
    pub async fn run(&mut self) -> ShellResult<QuitReason> {
        loop {
            let Some(event) = self.events_rx.recv().await else {
                // every sender is gone, nothing can wake the loop again
                return self.shutdown(QuitReason::AllWindowsClosed).await;
            };
            process_debug!(ProcessId::current(), "📨 Shell event: {:?}", event);

            match event {
                ShellEvent::WindowOpened => self.windows.on_opened(),
                ShellEvent::WindowClosed => {
                    let backend = self.context.backend();
                    match self.windows.on_closed(&backend).await {
                        Ok(AfterClose::Quit) => return self.shutdown(QuitReason::AllWindowsClosed).await,
                        Ok(AfterClose::StayResident) => {}
                        Err(e) => logging::log_error(ProcessId::current(), "Stopping backend", &e),
                    }
                }
                ShellEvent::ActivateRequested => match self.windows.on_activate().await {
                    Ok(true) => {
                        process_info!(ProcessId::current(), "🪟 Window reopened");
                    }
                    Ok(false) => {}
                    Err(e) => logging::log_error(ProcessId::current(), "Reopening window", &e),
                },
                ShellEvent::BackendExited { generation, exit_code } => {
                    self.windows.on_backend_exited(generation, exit_code);
                }
                ShellEvent::Quit(reason) => return self.shutdown(reason).await,
            }
        }
    }

    /// Stop the backend and wait (bounded) for its exit to be observed
    async fn shutdown(&mut self, reason: QuitReason) -> ShellResult<QuitReason> {
        logging::log_shutdown(ProcessId::current(), &reason.to_string());

        let backend = self.supervisor.current();
        if backend.is_live() {
            self.supervisor.stop(&backend).await?;

            let mut watch = self.supervisor.watch();
            let wait = self.context.config().stop_grace + EXIT_OBSERVE_SLACK;
            let exited = tokio::time::timeout(wait, watch.wait_for(|handle| !handle.is_live())).await;
            if !matches!(exited, Ok(Ok(_))) {
                process_warn!(ProcessId::current(), "Backend exit not observed within {:?}", wait);
            }
        }

        Ok(reason)
    }
}

/// Forward SIGINT/SIGTERM to the shell loop as quit events
pub fn spawn_signal_listener(context: ShellContext) {
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        match signal {
            Ok(name) => context.emit(ShellEvent::Quit(QuitReason::Signal(name.to_string()))),
            Err(e) => logging::log_error(ProcessId::current(), "Signal handling", &e),
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl+C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_dev_server_url_carries_bridge() {
        let ui = UiSource::DevServer(Url::parse("http://localhost:5173").unwrap());
        let url = ui_url(&ui, Some("http://127.0.0.1:41000")).unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(5173));
        assert_eq!(
            url.query_pairs().find(|(k, _)| k == "bridge").map(|(_, v)| v.into_owned()),
            Some("http://127.0.0.1:41000".to_string())
        );
    }

    #[test]
    fn test_packaged_ui_is_served_by_bridge() {
        let ui = UiSource::Packaged(PathBuf::from("/opt/app/ui"));
        let url = ui_url(&ui, Some("http://127.0.0.1:41000")).unwrap();
        assert_eq!(url.port(), Some(41000));
        assert!(ui_url(&ui, None).is_err());
    }

    #[test]
    fn test_dev_server_without_bridge_is_unchanged() {
        let ui = UiSource::DevServer(Url::parse("http://localhost:5173/").unwrap());
        assert_eq!(ui_url(&ui, None).unwrap().as_str(), "http://localhost:5173/");
    }
}
