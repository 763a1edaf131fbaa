//! Shared types for the desktop shell
//!
//! Contains the data model exchanged between the shell core and the
//! presentation layer: backend process snapshots, gateway envelopes and
//! update session snapshots. Component-internal types stay in their crates.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{
    // Backend process lifecycle
    BackendProcessHandle, BackendStatus, LOOPBACK_HOST,

    // Presentation ↔ backend gateway
    normalize_endpoint, ApiRequestEnvelope, ApiResponseEnvelope, HttpMethod,

    // Update state machine snapshots
    PromptAction, ReleaseInfo, UpdateSession, UpdateStatus,
};
