//! Stream-json session manager for the Claude Code CLI.
//!
//! Starts the CLI once per working directory, writes one JSON request per
//! run, and hands every output line back to the caller while logging the
//! significant ones and tracking the files the CLI modified.

pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod protocol;
pub mod session;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use session::{ModifiedFiles, RunOutcome, RunState, SessionEvent, SessionManager};
pub use tokio_util::sync::CancellationToken;
