//! Session Error Types
//!
//! Error handling for runs against the Claude CLI subprocess

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the session manager and the process session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session manager has been disposed")]
    Disposed,

    // Launch errors
    #[error("Claude CLI not found. Ensure '{command}' is installed and on PATH. Details: {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Process health errors
    #[error("Claude CLI process has unexpectedly terminated")]
    ProcessTerminated,

    #[error("Claude CLI output stream closed unexpectedly")]
    StreamClosed,

    #[error("Claude CLI process is not running")]
    NotRunning,

    // Run outcomes that are not normal completion
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Claude CLI request timed out after {}", format_duration(.0))]
    Timeout(Duration),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Cancellation is an outcome the caller asked for, not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Errors after which the subprocess must not be reused
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Disposed | Self::InvalidConfig(_))
    }
}

impl From<SessionError> for String {
    fn from(err: SessionError) -> String {
        err.to_string()
    }
}

fn format_duration(d: &Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} minutes", secs / 60)
    } else if secs > 0 && d.subsec_millis() == 0 {
        format!("{} seconds", secs)
    } else {
        format!("{} ms", d.as_millis())
    }
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_duration() {
        let err = SessionError::Timeout(Duration::from_secs(600));
        assert_eq!(err.to_string(), "Claude CLI request timed out after 10 minutes");

        let err = SessionError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().ends_with("250 ms"));
    }

    #[test]
    fn test_launch_failure_mentions_path() {
        let err = SessionError::LaunchFailed {
            command: "claude".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let msg = err.to_string();
        assert!(msg.contains("'claude'"));
        assert!(msg.contains("PATH"));
    }

    #[test]
    fn test_cancellation_is_not_fatal() {
        assert!(SessionError::Cancelled.is_cancelled());
        assert!(!SessionError::Cancelled.is_fatal());
        assert!(SessionError::StreamClosed.is_fatal());
        assert!(SessionError::Timeout(Duration::from_secs(1)).is_timeout());
    }
}
