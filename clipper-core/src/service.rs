//! Chat service detection from the page location.

use serde::{Deserialize, Serialize};

/// A supported AI chat website, or `Unsupported` for everything else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    ChatGpt,
    Claude,
    Gemini,
    Unsupported,
}

/// Hostname fragments and the service they identify. Checked in order.
const HOST_TABLE: &[(&str, Service)] = &[
    ("chatgpt.com", Service::ChatGpt),
    ("chat.openai.com", Service::ChatGpt),
    ("claude.ai", Service::Claude),
    ("gemini.google.com", Service::Gemini),
    ("aistudio.google.com", Service::Gemini),
];

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::ChatGpt => "chatgpt",
            Service::Claude => "claude",
            Service::Gemini => "gemini",
            Service::Unsupported => "unsupported",
        }
    }

    /// Human readable name used in note headers and frontmatter
    pub fn display_name(&self) -> &'static str {
        match self {
            Service::ChatGpt => "ChatGPT",
            Service::Claude => "Claude",
            Service::Gemini => "Gemini",
            Service::Unsupported => "Unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Service::Unsupported)
    }

    /// Every supported service, in table order
    pub fn supported() -> &'static [Service] {
        &[Service::ChatGpt, Service::Claude, Service::Gemini]
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Classify a hostname. `Unsupported` is a valid answer, not an error.
pub fn detect(hostname: &str) -> Service {
    let host = hostname.trim().to_ascii_lowercase();
    HOST_TABLE
        .iter()
        .find(|(fragment, _)| host.contains(fragment))
        .map(|(_, service)| *service)
        .unwrap_or(Service::Unsupported)
}

/// Classify a full URL by its host. Strings that do not parse as URLs are
/// treated as bare hostnames.
pub fn detect_url(location: &str) -> Service {
    match url::Url::parse(location) {
        Ok(parsed) => parsed.host_str().map(detect).unwrap_or(Service::Unsupported),
        Err(_) => detect(location),
    }
}
