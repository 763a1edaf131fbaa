//! Common test utilities and infrastructure
//!
//! Shared fixtures and the mock-backed shell builder used by the integration
//! tests.

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::ShellBuilder;
