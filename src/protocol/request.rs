//! Run Request
//!
//! The single-line user message written to the CLI's stdin.

use serde::{Deserialize, Serialize};

/// Outbound `{"type":"user","message":{...}}` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: UserMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

/// A content part of the user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
}

impl RunRequest {
    /// Build a user request carrying a single text prompt
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            kind: "user".to_string(),
            message: UserMessage {
                role: "user".to_string(),
                content: vec![ContentPart::Text { text: prompt.into() }],
            },
        }
    }

    /// Serialize to exactly one line (no trailing newline).
    ///
    /// serde_json escapes embedded newlines, so a multi-line prompt still
    /// produces a single line on the wire.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
