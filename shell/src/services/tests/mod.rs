//! Service-specific tests
//!
//! Each service has its own test file. Process tests drive `/bin/sh`, HTTP
//! tests run against `wiremock` servers, file tests use temp directories.

#[cfg(test)]
mod readiness;
#[cfg(test)]
mod update_feed;

// Common test utilities for services
#[cfg(test)]
pub mod common {
    use shared::{BackendProcessHandle, BackendStatus, LOOPBACK_HOST};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Standard timeout for async operations in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Helper to run async operations with timeout
    pub async fn with_timeout<T, F>(future: F) -> Result<T, tokio::time::error::Elapsed>
    where
        F: std::future::Future<Output = T>,
    {
        timeout(TEST_TIMEOUT, future).await
    }

    /// A running backend handle pointing at `port`
    pub fn running_handle(port: u16) -> BackendProcessHandle {
        BackendProcessHandle {
            generation: 1,
            pid: Some(4242),
            port: Some(port),
            host: LOOPBACK_HOST.to_string(),
            status: BackendStatus::Running,
            exit_code: None,
        }
    }
}
