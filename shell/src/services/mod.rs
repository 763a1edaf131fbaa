//! Service implementations
//!
//! Real implementations of the seam traits plus the concrete services the
//! shell wires together. These do the actual process, file and network I/O.

pub mod gateway;
pub mod installer;
pub mod instance_guard;
pub mod output_handler;
pub mod port_allocator;
pub mod readiness;
pub mod supervisor;
pub mod surface;
pub mod update_feed;

#[cfg(test)]
mod tests;

pub use gateway::ApiGateway;
pub use installer::SelfReplaceInstaller;
pub use instance_guard::{InstanceRecord, SingleInstanceGuard};
pub use port_allocator::OsPortAllocator;
pub use readiness::{Readiness, ReadinessProbe};
pub use supervisor::RealSupervisor;
pub use surface::{BrowserSurface, PageGuard, PageTracker};
pub use update_feed::S3UpdateFeed;
