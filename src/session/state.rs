//! Session State Management
//!
//! Tracks the run state machine and the live subprocess of the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

use super::events::SessionEvent;

/// State of the session manager's run slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    /// No run in flight
    Idle,
    /// Making sure the subprocess is up and writing the request
    Starting,
    /// Request written, reading output until a `result` line
    AwaitingResponse,
    /// The last run ended with an error
    Failed,
}

impl Default for RunState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::AwaitingResponse => write!(f, "awaitingResponse"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Mutable bookkeeping owned by the session manager
#[derive(Debug)]
pub struct SessionState {
    pub state: RunState,
    /// Working directory of the live subprocess
    pub working_dir: Option<PathBuf>,
    /// Process ID if running
    pub pid: Option<u32>,
    /// When the live subprocess was started
    pub process_started_at: Option<DateTime<Utc>>,
    pub runs_completed: u64,
    pub last_error: Option<String>,
    pub last_activity: DateTime<Utc>,
    /// Event broadcaster for observers
    pub event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            state: RunState::Idle,
            working_dir: None,
            pid: None,
            process_started_at: None,
            runs_completed: 0,
            last_error: None,
            last_activity: Utc::now(),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers; having none is fine
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Update state and emit event
    pub fn set_state(&mut self, state: RunState) {
        let old_state = self.state;
        self.state = state;
        self.last_activity = Utc::now();

        if old_state != state {
            self.emit(SessionEvent::StateChanged {
                old_state,
                new_state: state,
            });
        }
    }

    pub fn set_process_started(&mut self, pid: u32, working_dir: PathBuf) {
        self.pid = Some(pid);
        self.working_dir = Some(working_dir.clone());
        self.process_started_at = Some(Utc::now());
        self.emit(SessionEvent::ProcessStarted { pid, working_dir });
    }

    pub fn set_process_stopped(&mut self) {
        if let Some(pid) = self.pid.take() {
            self.emit(SessionEvent::ProcessStopped { pid });
        }
        self.process_started_at = None;
    }

    pub fn set_completed(&mut self) {
        self.runs_completed += 1;
        self.last_error = None;
        self.set_state(RunState::Idle);
    }

    pub fn set_failed(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.set_state(RunState::Failed);
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, RunState::Starting | RunState::AwaitingResponse)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub state: RunState,
    pub working_dir: Option<PathBuf>,
    pub pid: Option<u32>,
    pub process_started_at: Option<String>,
    pub runs_completed: u64,
    pub last_error: Option<String>,
    pub last_activity: String,
}

impl From<&SessionState> for SessionInfo {
    fn from(state: &SessionState) -> Self {
        Self {
            state: state.state,
            working_dir: state.working_dir.clone(),
            pid: state.pid,
            process_started_at: state.process_started_at.map(|t| t.to_rfc3339()),
            runs_completed: state.runs_completed,
            last_error: state.last_error.clone(),
            last_activity: state.last_activity.to_rfc3339(),
        }
    }
}
