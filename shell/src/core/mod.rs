//! Core shell state: event types, explicit context and pure state machines

pub mod context;
pub mod events;
pub mod status_channel;
pub mod update_machine;

pub use context::ShellContext;
pub use events::{QuitReason, ShellEvent};
pub use status_channel::{StatusBroadcaster, Subscription};
pub use update_machine::{UpdateEvent, UpdateMachine};
