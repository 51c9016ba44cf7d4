//! Core types shared across the clipping pipeline.
//!
//! Messages are produced by the extractor, grouped into capture results by
//! the capture strategies, and consumed by the note assembler.

use serde::{Deserialize, Serialize};

use crate::vault::SaveError;

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse an explicit role attribute value. Unknown values yield `None`.
    pub fn from_attribute(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "human" => Some(Role::User),
            "assistant" | "model" | "ai" | "bot" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One extracted chat message.
///
/// `content` is an HTML fragment taken from a clone of the page, never from
/// the live document. `part`/`total_parts` are only set when an oversized
/// message was split by the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// ISO-8601 extraction time
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_parts: Option<usize>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            part: None,
            total_parts: None,
        }
    }

    pub fn is_split(&self) -> bool {
        self.total_parts.map(|total| total > 1).unwrap_or(false)
    }
}

/// Which messages a save action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    /// The one message whose save button was pressed
    Single,
    /// Messages intersecting the user's text selection
    Selection,
    /// The last `messageCount` messages
    LastN,
    /// The whole thread
    Full,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Single => "single",
            CaptureMode::Selection => "selection",
            CaptureMode::LastN => "lastN",
            CaptureMode::Full => "full",
        }
    }

    /// Parse a mode name as used in preferences and on the command line
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "single" => Some(CaptureMode::Single),
            "selection" => Some(CaptureMode::Selection),
            "lastn" | "last-n" | "last_n" | "recent" => Some(CaptureMode::LastN),
            "full" | "all" => Some(CaptureMode::Full),
            _ => None,
        }
    }
}

/// Ordered messages produced by one capture strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureResult {
    pub messages: Vec<Message>,
    /// Elements that were matched but produced no message
    pub skipped: usize,
}

impl CaptureResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Element-level extraction failures. These are logged and the element is
/// skipped; they never abort a multi-message capture.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Content root could not be resolved from <{0}>")]
    NoContentRoot(String),

    #[error("Message has no visible content")]
    Empty,
}

/// Errors surfaced by the clipping pipeline
#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("Unsupported page: {0}")]
    UnsupportedService(String),

    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("Message index {index} out of range ({available} messages)")]
    TargetOutOfRange { index: usize, available: usize },

    #[error("Background split failed: {0}")]
    Worker(String),

    #[error("Save failed: {0}")]
    Save(#[from] SaveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClipError {
    /// Stable code for the UI layer
    pub fn code(&self) -> &'static str {
        match self {
            ClipError::UnsupportedService(_) => "unsupported_service",
            ClipError::InvalidSelector(_) => "invalid_selector",
            ClipError::TargetOutOfRange { .. } => "target_out_of_range",
            ClipError::Worker(_) => "worker_failed",
            ClipError::Save(e) => e.code(),
            ClipError::Io(_) => "io_error",
            ClipError::Json(_) => "invalid_request",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_attribute() {
        assert_eq!(Role::from_attribute("user"), Some(Role::User));
        assert_eq!(Role::from_attribute(" Assistant "), Some(Role::Assistant));
        assert_eq!(Role::from_attribute("model"), Some(Role::Assistant));
        assert_eq!(Role::from_attribute("system"), None);
    }

    #[test]
    fn test_capture_mode_parse() {
        assert_eq!(CaptureMode::parse("lastN"), Some(CaptureMode::LastN));
        assert_eq!(CaptureMode::parse("recent"), Some(CaptureMode::LastN));
        assert_eq!(CaptureMode::parse("FULL"), Some(CaptureMode::Full));
        assert_eq!(CaptureMode::parse("everything"), None);
    }

    #[test]
    fn test_capture_mode_serde_names() {
        let json = serde_json::to_string(&CaptureMode::LastN).unwrap();
        assert_eq!(json, "\"lastN\"");
        let mode: CaptureMode = serde_json::from_str("\"selection\"").unwrap();
        assert_eq!(mode, CaptureMode::Selection);
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let mut message = Message::new(Role::User, "<p>hi</p>");
        message.part = Some(1);
        message.total_parts = Some(2);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["totalParts"], 2);
        assert!(message.is_split());
    }

    #[test]
    fn test_message_timestamp_is_iso8601() {
        let message = Message::new(Role::Assistant, "");
        assert!(chrono::DateTime::parse_from_rfc3339(&message.timestamp).is_ok());
    }
}
