//! Backend process supervisor
//!
//! Spawns the backend, forwards its output, watches for exit and tears it
//! down on request. The supervisor owns the only `watch::Sender` for the
//! backend handle; every other component reads snapshots.

use async_trait::async_trait;
use shared::{
    logging, process_debug, process_error, process_info, process_warn, BackendProcessHandle, BackendStatus,
    ProcessId, LOOPBACK_HOST,
};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use crate::core::ShellEvent;
use crate::error::{ShellError, ShellResult};
use crate::services::output_handler::forward_output;
use crate::traits::{LaunchSpec, ProcessSupervisor};

/// Upper bound for draining output after the backend exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Bookkeeping for the live child; the child itself is owned by its monitor task
struct ManagedChild {
    generation: u64,
    pid: Option<u32>,
    /// Asks the monitor to force-kill; taken once termination started
    kill_tx: Option<oneshot::Sender<()>>,
}

/// Real supervisor backed by `tokio::process`
pub struct RealSupervisor {
    state: Arc<watch::Sender<BackendProcessHandle>>,
    child: Arc<Mutex<Option<ManagedChild>>>,
    /// Serializes `start` so two callers cannot both observe "not live"
    start_lock: Mutex<()>,
    events: Option<mpsc::UnboundedSender<ShellEvent>>,
    stop_grace: Duration,
}

impl RealSupervisor {
    pub fn new() -> Self {
        let (state, _) = watch::channel(BackendProcessHandle::not_started());
        Self {
            state: Arc::new(state),
            child: Arc::new(Mutex::new(None)),
            start_lock: Mutex::new(()),
            events: None,
            stop_grace: Duration::from_secs(5),
        }
    }

    /// Deliver `BackendExited` to the shell loop (fluent API)
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ShellEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Time between SIGTERM and force kill (fluent API)
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    fn publish(&self, handle: &BackendProcessHandle) {
        self.state.send_replace(handle.clone());
    }

    fn build_command(spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args)
            .arg("--port")
            .arg(spec.port.to_string())
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn failed_handle(generation: u64, port: u16) -> BackendProcessHandle {
        BackendProcessHandle {
            generation,
            pid: None,
            port: Some(port),
            host: LOOPBACK_HOST.to_string(),
            status: BackendStatus::FailedToStart,
            exit_code: None,
        }
    }

    /// Ask the live child of `generation` to terminate. Returns false when
    /// there is nothing left to terminate.
    async fn terminate(&self, generation: u64, force: bool) -> bool {
        let (pid, kill_tx) = {
            let mut slot = self.child.lock().await;
            match slot.as_mut() {
                Some(managed) if managed.generation == generation => match managed.kill_tx.take() {
                    Some(kill_tx) => (managed.pid, kill_tx),
                    None => return false,
                },
                _ => return false,
            }
        };

        if force || !send_sigterm(pid) {
            let _ = kill_tx.send(());
            return true;
        }

        let grace = self.stop_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // the receiver is gone once the child exited on its own
            if kill_tx.send(()).is_ok() {
                process_warn!(
                    ProcessId::current(),
                    "🔨 Backend did not exit within {:?} of SIGTERM, killing it",
                    grace
                );
            }
        });
        true
    }
}

impl Default for RealSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessSupervisor for RealSupervisor {
    async fn start(&self, spec: LaunchSpec) -> BackendProcessHandle {
        let _guard = self.start_lock.lock().await;

        let current = self.state.borrow().clone();
        if current.is_live() {
            process_debug!(
                ProcessId::current(),
                "Backend generation {} is still {:?}, not spawning another",
                current.generation,
                current.status
            );
            return current;
        }

        let generation = current.generation + 1;

        if !spec.executable.is_file() {
            let err = ShellError::ExecutableNotFound {
                path: spec.executable.clone(),
            };
            logging::log_error(ProcessId::current(), "Backend launch", &err);
            let handle = Self::failed_handle(generation, spec.port);
            self.publish(&handle);
            return handle;
        }

        let mut handle = BackendProcessHandle {
            generation,
            pid: None,
            port: Some(spec.port),
            host: LOOPBACK_HOST.to_string(),
            status: BackendStatus::Starting,
            exit_code: None,
        };
        self.publish(&handle);

        let mut child = match Self::build_command(&spec).spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = ShellError::spawn(format!("{}: {e}", spec.executable.display()));
                logging::log_error(ProcessId::current(), "Backend launch", &err);
                let handle = Self::failed_handle(generation, spec.port);
                self.publish(&handle);
                return handle;
            }
        };

        handle.pid = child.id();
        handle.status = BackendStatus::Running;
        let readers = forward_output(&mut child);

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.child.lock().await = Some(ManagedChild {
            generation,
            pid: handle.pid,
            kill_tx: Some(kill_tx),
        });
        self.publish(&handle);

        process_info!(
            ProcessId::current(),
            "🐍 Backend spawned (PID: {}) on {}:{} [generation {}]",
            handle.pid.map(|pid| pid.to_string()).unwrap_or_else(|| "?".to_string()),
            LOOPBACK_HOST,
            spec.port,
            generation
        );

        tokio::spawn(monitor(
            child,
            generation,
            readers,
            kill_rx,
            Arc::clone(&self.state),
            Arc::clone(&self.child),
            self.events.clone(),
        ));

        handle
    }

    async fn stop(&self, handle: &BackendProcessHandle) -> ShellResult<()> {
        let current = self.state.borrow().clone();
        if current.generation != handle.generation || !current.is_live() {
            process_debug!(
                ProcessId::current(),
                "Stop ignored for backend generation {} ({:?})",
                handle.generation,
                current.status
            );
            return Ok(());
        }

        if self.terminate(handle.generation, false).await {
            process_info!(ProcessId::current(), "🛑 Stopping backend generation {}", handle.generation);
        }
        Ok(())
    }

    async fn mark_failed(&self, handle: &BackendProcessHandle, reason: &str) -> ShellResult<()> {
        let mut changed = false;
        self.state.send_if_modified(|current| {
            if current.generation == handle.generation && current.is_live() {
                current.status = BackendStatus::FailedToStart;
                changed = true;
            }
            changed
        });

        if changed {
            process_error!(
                ProcessId::current(),
                "❌ Backend generation {} failed to start: {}",
                handle.generation,
                reason
            );
            self.terminate(handle.generation, true).await;
        }
        Ok(())
    }

    fn current(&self) -> BackendProcessHandle {
        self.state.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<BackendProcessHandle> {
        self.state.subscribe()
    }
}

/// Wait for the child to exit (or be killed), drain its output, then publish
/// the exit and notify the shell exactly once.
async fn monitor(
    mut child: Child,
    generation: u64,
    readers: Vec<JoinHandle<usize>>,
    mut kill_rx: oneshot::Receiver<()>,
    state: Arc<watch::Sender<BackendProcessHandle>>,
    slot: Arc<Mutex<Option<ManagedChild>>>,
    events: Option<mpsc::UnboundedSender<ShellEvent>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            if let Err(e) = child.start_kill() {
                process_warn!(ProcessId::current(), "Force kill of backend failed: {}", e);
            }
            child.wait().await
        }
    };

    let exit_code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            process_error!(ProcessId::current(), "Waiting on backend failed: {}", e);
            None
        }
    };

    for reader in readers {
        let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await;
    }

    state.send_modify(|current| {
        if current.generation == generation {
            if current.is_live() {
                current.status = BackendStatus::Exited;
            }
            current.exit_code = exit_code;
        }
    });

    {
        let mut slot = slot.lock().await;
        if slot.as_ref().map(|managed| managed.generation) == Some(generation) {
            *slot = None;
        }
    }

    process_info!(
        ProcessId::current(),
        "Backend generation {} exited with code {}",
        generation,
        exit_code.map(|code| code.to_string()).unwrap_or_else(|| "unknown".to_string())
    );

    if let Some(events) = events {
        let _ = events.send(ShellEvent::BackendExited { generation, exit_code });
    }
}

/// Exit code, or `128 + signal` for signal deaths on unix
fn exit_code(status: ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|signal| 128 + signal))
    }
    #[cfg(not(unix))]
    {
        status.code()
    }
}

#[cfg(unix)]
fn send_sigterm(pid: Option<u32>) -> bool {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => {
            process_debug!(ProcessId::current(), "📤 Sent SIGTERM to backend {}", raw);
            true
        }
        Err(e) => {
            process_warn!(ProcessId::current(), "SIGTERM to backend {} failed: {}", raw, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: Option<u32>) -> bool {
    false
}
