//! Explicit shell context handed to every component that needs shared state

use shared::{process_debug, BackendProcessHandle, ProcessId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::config::ShellConfig;
use crate::core::events::ShellEvent;

/// Backend state reader, event sender and configuration
///
/// Cheap to clone. The backend receiver is read-only; the supervisor owns the
/// only sender.
#[derive(Clone)]
pub struct ShellContext {
    backend: watch::Receiver<BackendProcessHandle>,
    events: mpsc::UnboundedSender<ShellEvent>,
    config: Arc<ShellConfig>,
}

impl ShellContext {
    pub fn new(
        backend: watch::Receiver<BackendProcessHandle>,
        events: mpsc::UnboundedSender<ShellEvent>,
        config: Arc<ShellConfig>,
    ) -> Self {
        Self { backend, events, config }
    }

    /// Latest backend handle snapshot
    pub fn backend(&self) -> BackendProcessHandle {
        self.backend.borrow().clone()
    }

    pub fn backend_watch(&self) -> watch::Receiver<BackendProcessHandle> {
        self.backend.clone()
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn events(&self) -> mpsc::UnboundedSender<ShellEvent> {
        self.events.clone()
    }

    /// Send an event to the shell loop; dropped silently once the loop ended
    pub fn emit(&self, event: ShellEvent) {
        if let Err(err) = self.events.send(event) {
            process_debug!(ProcessId::current(), "Shell loop gone, dropping {:?}", err.0);
        }
    }
}
