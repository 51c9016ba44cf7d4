//! Request and response payloads exchanged with the extension

use serde::{Deserialize, Serialize};

use crate::config::Preferences;
use crate::types::{CaptureMode, ClipError};
use crate::vault::{SaveError, SavedNote};

/// Selection range sent by the extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionSpec {
    /// From the first text containing `start` to the first text at or after
    /// it containing `end`
    Text { start: String, end: String },
    /// First to last element matching a CSS selector
    Selector(String),
}

/// One clip request: a page snapshot plus what to capture from it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequest {
    /// Page location, used for service detection and the note
    pub url: String,

    /// Serialized page document
    pub html: String,

    /// Capture mode; the preferred default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<CaptureMode>,

    /// Message count for `lastN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    /// Message index for `single` (last message when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<usize>,

    /// Active selection for `selection` mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionSpec>,

    /// Title override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Preferences override; the configured ones when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Preferences>,
}

impl ClipRequest {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            mode: None,
            count: None,
            target: None,
            selection: None,
            title: None,
            preferences: None,
        }
    }
}

/// Result of a save attempt as the UI sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl SaveResponse {
    pub fn saved(note: &SavedNote) -> Self {
        Self {
            success: true,
            method: Some(note.method.as_str().to_string()),
            filename: Some(note.filename.clone()),
            error: None,
            code: None,
        }
    }

    /// Failure with the localized message for the error's code
    pub fn save_failed(error: &SaveError, locale: &str) -> Self {
        Self::error(error.user_message(locale), error.code())
    }

    pub fn clip_failed(error: &ClipError, locale: &str) -> Self {
        match error {
            ClipError::Save(save) => Self::save_failed(save, locale),
            other => Self::error(&other.to_string(), other.code()),
        }
    }

    /// Nothing was captured, so nothing was saved
    pub fn nothing_to_save() -> Self {
        Self::error("Nothing to save", "nothing_to_save")
    }

    pub fn error(message: &str, code: &str) -> Self {
        Self {
            success: false,
            method: None,
            filename: None,
            error: Some(message.to_string()),
            code: Some(code.to_string()),
        }
    }
}

/// Native messaging envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum HostMessage {
    Ping,
    Clip(ClipRequest),
}

/// Native messaging replies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostReply {
    /// Answer to `ping`
    Status { received: bool },
    /// A note built for the extension to save through its own transport
    Note {
        content: String,
        filename: String,
        #[serde(rename = "messageCount")]
        message_count: usize,
    },
    /// Outcome of a save the host performed itself
    Saved(SaveResponse),
}
