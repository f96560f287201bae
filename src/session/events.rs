//! Session Events
//!
//! Observable lifecycle events of the session manager.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::state::RunState;

/// Events broadcast to subscribers of a [`SessionManager`](super::SessionManager)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// Run state changed
    StateChanged {
        old_state: RunState,
        new_state: RunState,
    },

    /// A subprocess was launched
    ProcessStarted { pid: u32, working_dir: PathBuf },

    /// The subprocess was torn down
    ProcessStopped { pid: u32 },

    /// A write/edit tool reported a path during the current run
    FileModified { run_id: String, path: String },

    /// Text read from the subprocess's stderr
    Stderr { text: String },

    /// A run ended
    RunFinished {
        run_id: String,
        disposition: RunDisposition,
    },
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RunDisposition {
    Completed,
    Cancelled,
    TimedOut,
    Failed { message: String },
}

impl SessionEvent {
    /// Event name for external bridges
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "session-state",
            Self::ProcessStarted { .. } => "session-process-started",
            Self::ProcessStopped { .. } => "session-process-stopped",
            Self::FileModified { .. } => "session-file-modified",
            Self::Stderr { .. } => "session-stderr",
            Self::RunFinished { .. } => "session-run-finished",
        }
    }
}
