//! OS-backed port allocation

use shared::{process_debug, ProcessId};

use crate::error::{ShellError, ShellResult};
use crate::traits::PortAllocator;

/// Asks the OS for an unused loopback port
#[derive(Debug, Default, Clone, Copy)]
pub struct OsPortAllocator;

impl OsPortAllocator {
    pub fn new() -> Self {
        Self
    }
}

impl PortAllocator for OsPortAllocator {
    fn allocate(&self) -> ShellResult<u16> {
        let port = portpicker::pick_unused_port().ok_or(ShellError::PortExhaustion)?;
        process_debug!(ProcessId::current(), "🔌 Allocated backend port {}", port);
        Ok(port)
    }
}
