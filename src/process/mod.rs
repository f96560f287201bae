//! Process Module
//!
//! The Claude CLI subprocess and its plumbing:
//! - Executable resolution across PATH and the npm global bin
//! - Background stderr pump with incremental UTF-8 decoding
//! - Process session lifecycle (spawn, health check, line I/O, teardown)

pub mod pump;
pub mod resolver;
pub mod session;

pub use pump::{PumpHandle, Utf8Decoder};
pub use resolver::CommandResolver;
pub use session::{OutputLines, ProcessSession, STDERR_PREFIX};
