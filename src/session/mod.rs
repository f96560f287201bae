//! Session Management Module
//!
//! One long-lived CLI subprocess driven as a request/response peer:
//! - Strictly serialized runs (one request in flight)
//! - Timeout and cancellation with teardown on every abnormal exit
//! - Restart when the working directory changes or the process died
//! - Per-run tracking of files the CLI wrote or edited

pub mod events;
pub mod manager;
pub mod state;
pub mod tracker;

pub use events::{RunDisposition, SessionEvent};
pub use manager::{RunOutcome, SessionManager};
pub use state::{RunState, SessionInfo};
pub use tracker::ModifiedFiles;
