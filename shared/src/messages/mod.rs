//! Message types for the desktop shell
//!
//! This module organizes the data model by component:
//! - `process`: Backend process lifecycle snapshots
//! - `api`: Gateway request/response envelopes
//! - `update`: Update session snapshots pushed to the presentation layer

pub mod api;
pub mod process;
pub mod update;

pub use api::{normalize_endpoint, ApiRequestEnvelope, ApiResponseEnvelope, HttpMethod};
pub use process::{BackendProcessHandle, BackendStatus, LOOPBACK_HOST};
pub use update::{PromptAction, ReleaseInfo, UpdateSession, UpdateStatus};
