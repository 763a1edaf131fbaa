//! Trait definitions with mockall annotations for testing
//!
//! Every seam where the shell touches the operating system or the network is
//! a trait here, so the shell, window manager and updater can be exercised
//! against mocks.

use shared::{BackendProcessHandle, ReleaseInfo};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};

use crate::error::ShellResult;

/// Everything needed to launch the backend once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub port: u16,
}

/// Where a release artifact lives and how the transport checks it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub url: String,
    /// Base64 sha512 published alongside the artifact
    pub sha512: Option<String>,
    pub size: Option<u64>,
}

/// A release as reported by the update feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRelease {
    pub info: ReleaseInfo,
    pub artifact: ArtifactRef,
}

/// Local port source for the backend
#[mockall::automock]
pub trait PortAllocator: Send + Sync {
    /// Obtain a currently unused loopback port
    fn allocate(&self) -> ShellResult<u16>;
}

/// Backend process lifecycle
///
/// The implementation is the single writer of the backend handle; everyone
/// else reads it through `watch()`.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Launch the backend. Failures are reported through the returned
    /// handle's status, never as an error.
    async fn start(&self, spec: LaunchSpec) -> BackendProcessHandle;

    /// Request termination. No-op for handles that are no longer live.
    async fn stop(&self, handle: &BackendProcessHandle) -> ShellResult<()>;

    /// Give up on a launched backend (e.g. readiness never reached): the
    /// handle becomes `failed-to-start` and the process is terminated.
    async fn mark_failed(&self, handle: &BackendProcessHandle, reason: &str) -> ShellResult<()>;

    /// Latest handle snapshot
    fn current(&self) -> BackendProcessHandle;

    /// Subscribe to handle snapshots
    fn watch(&self) -> watch::Receiver<BackendProcessHandle>;
}

/// The rendering surface hosting the presentation layer
#[mockall::automock]
#[async_trait::async_trait]
pub trait PresentationSurface: Send + Sync {
    /// Create a window showing `url`
    async fn open_window(&self, url: &str) -> ShellResult<()>;

    /// Number of windows currently alive
    fn window_count(&self) -> usize;
}

/// Remote update feed and its artifact transport
#[mockall::automock]
#[async_trait::async_trait]
pub trait UpdateFeed: Send + Sync {
    /// Fetch the newest published release
    async fn latest(&self) -> ShellResult<FeedRelease>;

    /// Download and verify the release artifact, reporting integer percent
    /// progress on `progress`. Returns the local artifact path.
    async fn download(
        &self,
        release: &FeedRelease,
        progress: mpsc::UnboundedSender<u8>,
    ) -> ShellResult<PathBuf>;
}

/// Applies a downloaded artifact to this installation
#[mockall::automock]
#[async_trait::async_trait]
pub trait Installer: Send + Sync {
    /// Stage the artifact so the next process start runs the new version
    async fn install(&self, artifact: &Path) -> ShellResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_trait_instantiation() {
        let _allocator = MockPortAllocator::new();
        let _supervisor = MockProcessSupervisor::new();
        let _surface = MockPresentationSurface::new();
        let _feed = MockUpdateFeed::new();
        let _installer = MockInstaller::new();
    }
}
