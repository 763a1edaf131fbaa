//! Test fixtures: canned backend handles and URLs

use shared::{BackendProcessHandle, BackendStatus, LOOPBACK_HOST};

pub struct TestFixtures;

impl TestFixtures {
    pub const BRIDGE_URL: &'static str = "http://127.0.0.1:41000";

    /// Handle of a running backend launched as generation 1 on `port`
    pub fn running(port: u16) -> BackendProcessHandle {
        BackendProcessHandle {
            generation: 1,
            pid: Some(4242),
            port: Some(port),
            host: LOOPBACK_HOST.to_string(),
            status: BackendStatus::Running,
            exit_code: None,
        }
    }

    /// Same launch after it terminated
    pub fn exited(port: u16, exit_code: i32) -> BackendProcessHandle {
        BackendProcessHandle {
            status: BackendStatus::Exited,
            exit_code: Some(exit_code),
            ..Self::running(port)
        }
    }
}
