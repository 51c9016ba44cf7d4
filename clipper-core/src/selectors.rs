//! Per-service selector registry.
//!
//! Chat sites change their markup without notice, so every semantic role maps
//! to an ordered list of candidate CSS selectors. Consumers try candidates in
//! order and use the first one that matches at least one element. Supporting
//! a new markup variant means appending a candidate here, not branching in
//! the extractor.

use scraper::{ElementRef, Selector};
use tracing::warn;

use crate::service::Service;

/// Semantic roles a selector candidate list can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorRole {
    /// One chat message (user or assistant)
    Message,
    /// Generic grouping containers used when `Message` finds nothing
    FallbackMessage,
    UserMessage,
    AssistantMessage,
    /// The part of a message element holding its rendered body
    Content,
    CodeBlock,
    InlineMath,
    BlockMath,
    /// Conversation title inside the page
    Title,
}

/// Read-only selector table for one service
#[derive(Debug)]
pub struct SelectorSet {
    pub service: Service,
    /// Attribute carrying an explicit author role, when the site provides one
    pub role_attribute: Option<&'static str>,
    pub message: &'static [&'static str],
    pub fallback_message: &'static [&'static str],
    pub user_message: &'static [&'static str],
    pub assistant_message: &'static [&'static str],
    pub content: &'static [&'static str],
    pub code_block: &'static [&'static str],
    pub inline_math: &'static [&'static str],
    pub block_math: &'static [&'static str],
    pub title: &'static [&'static str],
}

impl SelectorSet {
    /// Ordered candidates for a role
    pub fn candidates(&self, role: SelectorRole) -> &'static [&'static str] {
        match role {
            SelectorRole::Message => self.message,
            SelectorRole::FallbackMessage => self.fallback_message,
            SelectorRole::UserMessage => self.user_message,
            SelectorRole::AssistantMessage => self.assistant_message,
            SelectorRole::Content => self.content,
            SelectorRole::CodeBlock => self.code_block,
            SelectorRole::InlineMath => self.inline_math,
            SelectorRole::BlockMath => self.block_math,
            SelectorRole::Title => self.title,
        }
    }
}

static CHATGPT: SelectorSet = SelectorSet {
    service: Service::ChatGpt,
    role_attribute: Some("data-message-author-role"),
    message: &[
        "[data-message-author-role]",
        "article[data-testid^=\"conversation-turn\"]",
    ],
    fallback_message: &[".group", "[data-testid^=\"conversation-turn\"]"],
    user_message: &[
        "[data-message-author-role=\"user\"]",
        ".whitespace-pre-wrap",
    ],
    assistant_message: &["[data-message-author-role=\"assistant\"]", ".markdown"],
    content: &[".markdown", ".whitespace-pre-wrap", "[data-message-content]"],
    code_block: &["pre"],
    inline_math: &[".katex"],
    block_math: &[".katex-display"],
    title: &["title"],
};

static CLAUDE: SelectorSet = SelectorSet {
    service: Service::Claude,
    role_attribute: None,
    message: &[
        "[data-testid=\"user-message\"], .font-claude-message, .font-claude-response",
        "[data-test-render-count] > div",
    ],
    fallback_message: &[".group", "[data-test-render-count]"],
    user_message: &["[data-testid=\"user-message\"]", ".font-user-message"],
    assistant_message: &[".font-claude-message", ".font-claude-response"],
    content: &[
        ".standard-markdown",
        ".progressive-markdown",
        ".grid-cols-1",
        ".whitespace-pre-wrap",
    ],
    code_block: &["pre"],
    inline_math: &[".katex"],
    block_math: &[".katex-display"],
    title: &["[data-testid=\"chat-menu-trigger\"]", "title"],
};

static GEMINI: SelectorSet = SelectorSet {
    service: Service::Gemini,
    role_attribute: None,
    message: &["user-query, model-response", "ms-chat-turn"],
    fallback_message: &[".conversation-container > *", ".chat-turn-container"],
    user_message: &["user-query", ".user-prompt-container"],
    assistant_message: &["model-response", ".model-prompt-container"],
    content: &[
        ".query-text",
        "message-content .markdown",
        ".markdown",
        ".turn-content",
    ],
    code_block: &["pre", "code-block"],
    inline_math: &[".math-inline", ".katex"],
    block_math: &[".math-block", ".katex-display"],
    title: &[".conversation-title", "title"],
};

/// Selector table for a service. `None` for `Unsupported`.
pub fn selectors_for(service: Service) -> Option<&'static SelectorSet> {
    match service {
        Service::ChatGpt => Some(&CHATGPT),
        Service::Claude => Some(&CLAUDE),
        Service::Gemini => Some(&GEMINI),
        Service::Unsupported => None,
    }
}

/// Parse a selector, logging and skipping invalid ones
pub fn parse(candidate: &str) -> Option<Selector> {
    Selector::parse(candidate)
        .map_err(|e| {
            warn!("Invalid selector '{}': {:?}", candidate, e);
            e
        })
        .ok()
}

/// Matches of the first candidate with at least one hit below `scope`
pub fn first_match<'a>(scope: ElementRef<'a>, candidates: &[&str]) -> Vec<ElementRef<'a>> {
    for candidate in candidates {
        let Some(selector) = parse(candidate) else {
            continue;
        };
        let matches: Vec<ElementRef<'a>> = scope.select(&selector).collect();
        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}

/// Whether `element` itself matches any candidate
pub fn matches_any(element: &ElementRef<'_>, candidates: &[&str]) -> bool {
    candidates
        .iter()
        .filter_map(|candidate| parse(candidate))
        .any(|selector| selector.matches(element))
}

/// Whether `element` or one of its descendants matches any candidate
pub fn contains_any(element: ElementRef<'_>, candidates: &[&str]) -> bool {
    candidates
        .iter()
        .filter_map(|candidate| parse(candidate))
        .any(|selector| selector.matches(&element) || element.select(&selector).next().is_some())
}
