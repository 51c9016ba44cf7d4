//! Chat Clipper Library
//!
//! Turns a snapshot of an AI chat page (ChatGPT, Claude, Gemini) into a
//! Markdown note for a local vault: service detection, message extraction,
//! capture strategies, HTML to Markdown conversion and note assembly.
//! Designed to be driven by a browser extension through the native host.

pub mod capture;
pub mod chunker;
pub mod clipper;
pub mod config;
pub mod dedup;
pub mod dom;
pub mod extractor;
pub mod markdown;
pub mod note;
pub mod page;
pub mod payload;
pub mod selectors;
pub mod service;
pub mod types;
pub mod vault;

pub use capture::CaptureRequest;
pub use clipper::{ClippedNote, Clipper};
pub use config::{Config, ConfigError, Preferences};
pub use markdown::{convert, MarkdownConverter};
pub use page::{PageContext, TextSelection};
pub use payload::{ClipRequest, HostMessage, HostReply, SaveResponse};
pub use service::Service;
pub use types::{CaptureMode, CaptureResult, ClipError, Message, Role};
pub use vault::{SaveError, SavedNote, VaultTransport};
