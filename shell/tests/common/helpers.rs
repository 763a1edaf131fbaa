//! Mock-backed shell builder

use shared::BackendProcessHandle;
use shell::config::ShellConfig;
use shell::services::SingleInstanceGuard;
use shell::traits::{
    MockInstaller, MockPortAllocator, MockPresentationSurface, MockProcessSupervisor, MockUpdateFeed,
};
use shell::{Shell, ShellContext, Updater};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use super::TestFixtures;

pub type MockShell = Shell<MockPortAllocator, MockProcessSupervisor, MockPresentationSurface>;

/// A shell wired to mocks plus the handles a test needs to drive it
pub struct Harness {
    pub shell: MockShell,
    pub guard: SingleInstanceGuard,
    pub context: ShellContext,
    /// Stands in for the supervisor's side of the backend watch
    pub backend_tx: watch::Sender<BackendProcessHandle>,
    pub _dir: TempDir,
}

/// Builder in the style of the service mocks: configure each mock with a
/// closure, then `build`.
pub struct ShellBuilder {
    allocator: MockPortAllocator,
    supervisor: MockProcessSupervisor,
    surface: MockPresentationSurface,
    config: ShellConfig,
    dir: TempDir,
}

impl ShellBuilder {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ShellConfig::for_app_dir(dir.path()).unwrap();
        config.readiness.attempts = 3;
        config.readiness.interval = Duration::from_millis(10);
        config.stop_grace = Duration::from_millis(100);

        Self {
            allocator: MockPortAllocator::new(),
            supervisor: MockProcessSupervisor::new(),
            surface: MockPresentationSurface::new(),
            config,
            dir,
        }
    }

    pub fn allocator(mut self, setup: impl FnOnce(&mut MockPortAllocator)) -> Self {
        setup(&mut self.allocator);
        self
    }

    pub fn supervisor(mut self, setup: impl FnOnce(&mut MockProcessSupervisor)) -> Self {
        setup(&mut self.supervisor);
        self
    }

    pub fn surface(mut self, setup: impl FnOnce(&mut MockPresentationSurface)) -> Self {
        setup(&mut self.surface);
        self
    }

    pub fn configure(mut self, setup: impl FnOnce(&mut ShellConfig)) -> Self {
        setup(&mut self.config);
        self
    }

    pub fn build(self) -> Harness {
        let (backend_tx, backend_rx) = watch::channel(BackendProcessHandle::not_started());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let guard = SingleInstanceGuard::new(&self.config.lock_path);
        let context = ShellContext::new(backend_rx, events_tx, Arc::new(self.config));

        let updater = Updater::new(
            Arc::new(MockUpdateFeed::new()),
            Arc::new(MockInstaller::new()),
            "1.0.0",
        );
        let shell = Shell::new(
            context.clone(),
            events_rx,
            Arc::new(self.allocator),
            Arc::new(self.supervisor),
            Arc::new(self.surface),
            updater,
        )
        .unwrap()
        .with_bridge_url(TestFixtures::BRIDGE_URL);

        Harness {
            shell,
            guard,
            context,
            backend_tx,
            _dir: self.dir,
        }
    }
}
