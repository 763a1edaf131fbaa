//! Browser-hosted presentation surface
//!
//! Windows are pages in the system browser. A page counts as open while it
//! holds a push connection to the bridge; the tracker turns "last page gone
//! and nothing reconnected within the grace period" into `WindowClosed`.

use async_trait::async_trait;
use shared::{process_debug, process_info, ProcessId};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::ShellEvent;
use crate::error::{ShellError, ShellResult};
use crate::traits::PresentationSurface;

#[derive(Debug, Default)]
struct PageCounts {
    pages: usize,
    /// Bumped on every connect/disconnect so stale close timers can tell
    epoch: u64,
}

/// Counts connected pages and reports open/close edges to the shell loop
pub struct PageTracker {
    counts: Mutex<PageCounts>,
    grace: Duration,
    events: mpsc::UnboundedSender<ShellEvent>,
}

impl PageTracker {
    pub fn new(grace: Duration, events: mpsc::UnboundedSender<ShellEvent>) -> Arc<Self> {
        Arc::new(Self {
            counts: Mutex::new(PageCounts::default()),
            grace,
            events,
        })
    }

    fn counts(&self) -> MutexGuard<'_, PageCounts> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn page_count(&self) -> usize {
        self.counts().pages
    }

    /// Register a connected page; the page stays counted until the guard drops
    pub fn connect(self: &Arc<Self>) -> PageGuard {
        let first = {
            let mut counts = self.counts();
            counts.pages += 1;
            counts.epoch += 1;
            counts.pages == 1
        };
        if first {
            let _ = self.events.send(ShellEvent::WindowOpened);
        }
        PageGuard {
            tracker: Arc::clone(self),
        }
    }

    fn disconnect(self: &Arc<Self>) {
        let epoch = {
            let mut counts = self.counts();
            counts.pages = counts.pages.saturating_sub(1);
            counts.epoch += 1;
            if counts.pages > 0 {
                return;
            }
            counts.epoch
        };

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(tracker.grace).await;
            let still_closed = {
                let counts = tracker.counts();
                counts.pages == 0 && counts.epoch == epoch
            };
            if still_closed {
                process_debug!(ProcessId::current(), "Last page gone for {:?}, window closed", tracker.grace);
                let _ = tracker.events.send(ShellEvent::WindowClosed);
            }
        });
    }
}

/// Keeps one page counted while alive
pub struct PageGuard {
    tracker: Arc<PageTracker>,
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.tracker.disconnect();
    }
}

/// Opens windows as browser pages
pub struct BrowserSurface {
    tracker: Arc<PageTracker>,
    launch_browser: bool,
}

impl BrowserSurface {
    pub fn new(tracker: Arc<PageTracker>) -> Self {
        Self {
            tracker,
            launch_browser: true,
        }
    }

    /// Log the URL instead of launching a browser (fluent API)
    pub fn with_browser(mut self, launch_browser: bool) -> Self {
        self.launch_browser = launch_browser;
        self
    }
}

#[async_trait]
impl PresentationSurface for BrowserSurface {
    async fn open_window(&self, url: &str) -> ShellResult<()> {
        if !self.launch_browser {
            process_info!(ProcessId::current(), "🪟 UI available at {}", url);
            return Ok(());
        }

        open::that_detached(url).map_err(|e| ShellError::surface(format!("failed to open {url}: {e}")))?;
        process_info!(ProcessId::current(), "🪟 Opened window at {}", url);
        Ok(())
    }

    fn window_count(&self) -> usize {
        self.tracker.page_count()
    }
}
