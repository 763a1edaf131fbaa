//! Desktop shell core
//!
//! Hosts the presentation layer, supervises a local backend service on a
//! dynamically allocated port, relays presentation-originated API calls to it
//! and manages the application's self-update lifecycle.

pub mod bridge;
pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod shell;
pub mod traits;
pub mod updater;
pub mod window;

// Re-export commonly used types
pub use bridge::{BridgeServer, BridgeState};
pub use config::{Args, ShellConfig};
pub use core::{QuitReason, ShellContext, ShellEvent, StatusBroadcaster, Subscription, UpdateMachine};
pub use error::{ShellError, ShellResult};
pub use shell::{LaunchOutcome, Shell};
pub use traits::{Installer, PortAllocator, PresentationSurface, ProcessSupervisor, UpdateFeed};
pub use updater::Updater;
pub use window::{AfterClose, WindowManager, WindowState};
