//! Window lifecycle manager
//!
//! Tracks whether the presentation surface is up and translates window events
//! into supervisor requests. It never reads backend state directly; backend
//! transitions arrive as events from the shell loop.

use shared::{process_info, process_warn, BackendProcessHandle, ProcessId};
use std::sync::Arc;

use crate::error::ShellResult;
use crate::traits::{PresentationSurface, ProcessSupervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Closed,
    Opening,
    Open,
}

/// What the shell should do after the last window closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterClose {
    Quit,
    StayResident,
}

pub struct WindowManager<S, P>
where
    S: PresentationSurface,
    P: ProcessSupervisor,
{
    surface: Arc<S>,
    supervisor: Arc<P>,
    state: WindowState,
    url: Option<String>,
    quit_when_closed: bool,
    backend_down: bool,
}

impl<S, P> WindowManager<S, P>
where
    S: PresentationSurface,
    P: ProcessSupervisor,
{
    pub fn new(surface: Arc<S>, supervisor: Arc<P>, quit_when_closed: bool) -> Self {
        Self {
            surface,
            supervisor,
            state: WindowState::Closed,
            url: None,
            quit_when_closed,
            backend_down: false,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn is_backend_down(&self) -> bool {
        self.backend_down
    }

    /// Create the surface showing `url`
    pub async fn open(&mut self, url: &str) -> ShellResult<()> {
        self.url = Some(url.to_string());
        self.state = WindowState::Opening;
        match self.surface.open_window(url).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = WindowState::Closed;
                Err(e)
            }
        }
    }

    /// A page attached to the surface
    pub fn on_opened(&mut self) {
        self.state = WindowState::Open;
    }

    /// The last window went away: stop the backend it was using
    pub async fn on_closed(&mut self, backend: &BackendProcessHandle) -> ShellResult<AfterClose> {
        self.state = WindowState::Closed;
        self.supervisor.stop(backend).await?;

        if self.quit_when_closed {
            Ok(AfterClose::Quit)
        } else {
            process_info!(ProcessId::current(), "All windows closed, staying resident");
            Ok(AfterClose::StayResident)
        }
    }

    /// Bring a window back if none remain. Returns whether one was opened.
    pub async fn on_activate(&mut self) -> ShellResult<bool> {
        if self.surface.window_count() > 0 || self.state == WindowState::Opening {
            return Ok(false);
        }
        match self.url.clone() {
            Some(url) => {
                self.open(&url).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// React to the backend's exit; windows stay up in degraded mode
    pub fn on_backend_exited(&mut self, generation: u64, exit_code: Option<i32>) {
        self.backend_down = true;
        if self.state != WindowState::Closed {
            process_warn!(
                ProcessId::current(),
                "Backend generation {} exited (code {:?}) while the window is open",
                generation,
                exit_code
            );
        }
    }
}
