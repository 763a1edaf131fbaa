//! Messages exchanged between the independent shell state machines

use std::fmt;

/// Why the shell is shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuitReason {
    AllWindowsClosed,
    Signal(String),
    UpdateInstalled,
}

impl fmt::Display for QuitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuitReason::AllWindowsClosed => f.write_str("all windows closed"),
            QuitReason::Signal(signal) => write!(f, "received {signal}"),
            QuitReason::UpdateInstalled => f.write_str("update installed"),
        }
    }
}

/// Events consumed by the shell event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// The backend launched as `generation` has terminated. Sent after its
    /// output streams were drained.
    BackendExited { generation: u64, exit_code: Option<i32> },
    /// A presentation page connected
    WindowOpened,
    /// The last presentation page went away
    WindowClosed,
    /// The user (or a second instance) asked for the window
    ActivateRequested,
    Quit(QuitReason),
}
