//! Protocol Module
//!
//! Line-delimited JSON spoken over the CLI's stdin/stdout:
//! - Outbound run request envelope
//! - Inbound event classification (log verdict, terminal detection, tool use)

pub mod classifier;
pub mod request;

pub use classifier::{EventKind, EventLine, StreamEventKind, ToolUse, FILE_MUTATING_TOOLS};
pub use request::RunRequest;
