//! Page-lifetime context.
//!
//! Everything that is scoped to one page load (the parsed document, the
//! detected service, the active selection, and which messages already got a
//! save button) lives in [`PageContext`] instead of module globals, so the
//! pipeline can be driven in tests without a real page.

use std::cell::RefCell;
use std::collections::HashSet;

use scraper::{ElementRef, Html, Node};
use tracing::{debug, info};

use crate::dedup::short_hash;
use crate::dom;
use crate::selectors::{self, SelectorRole, SelectorSet};
use crate::service::{self, Service};
use crate::types::{ClipError, Role};

/// Marker class carried by the save buttons the extension appends to messages
pub const SAVE_BUTTON_CLASS: &str = "ai-clipper-save-btn";

/// Where the external observer should attach a save button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonPlacement {
    /// Stable key of the message element (id attribute or content hash)
    pub message_key: String,
    pub role: Role,
    /// Position of the message among all message elements on the page
    pub index: usize,
}

/// Parsed page plus the state scoped to its lifetime
pub struct PageContext {
    document: Html,
    url: String,
    service: Service,
    selectors: Option<&'static SelectorSet>,
    selection: Option<TextSelection>,
    attached: RefCell<HashSet<String>>,
}

impl PageContext {
    /// Parse `html` as the document loaded at `url`
    pub fn new(url: impl Into<String>, html: &str) -> Self {
        let url = url.into();
        let service = service::detect_url(&url);
        let selectors = selectors::selectors_for(service);
        if selectors.is_none() {
            info!("Unsupported page, clipper inactive: {}", url);
        }

        Self {
            document: Html::parse_document(html),
            url,
            service,
            selectors,
            selection: None,
            attached: RefCell::new(HashSet::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn selectors(&self) -> Option<&'static SelectorSet> {
        self.selectors
    }

    /// Selectors, or `UnsupportedService` for pages outside the table
    pub fn require_selectors(&self) -> Result<&'static SelectorSet, ClipError> {
        self.selectors
            .ok_or_else(|| ClipError::UnsupportedService(self.url.clone()))
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.document.root_element()
    }

    pub fn selection(&self) -> Option<&TextSelection> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, selection: Option<TextSelection>) {
        self.selection = selection;
    }

    /// Message elements in document order.
    ///
    /// Uses the primary message candidates, then the fallback grouping
    /// candidates when the primary ones match nothing. Matches nested inside
    /// another match are dropped so no message is captured twice.
    pub fn message_elements(&self) -> Vec<ElementRef<'_>> {
        let Some(set) = self.selectors else {
            return Vec::new();
        };

        let root = self.root();
        let mut elements = selectors::first_match(root, set.candidates(SelectorRole::Message));
        if elements.is_empty() {
            debug!("No primary message matches, trying fallback containers");
            elements = selectors::first_match(root, set.candidates(SelectorRole::FallbackMessage));
        }

        let ids: HashSet<_> = elements.iter().map(|el| el.id()).collect();
        elements.retain(|el| !el.ancestors().any(|ancestor| ids.contains(&ancestor.id())));
        elements
    }

    /// Message element at `index` in document order
    pub fn message_at(&self, index: usize) -> Option<ElementRef<'_>> {
        self.message_elements().into_iter().nth(index)
    }

    /// Decide where save buttons go for a node the page observer reported.
    ///
    /// Returns one placement per message element at or under `node` that
    /// does not already carry a button and is not still streaming. Each
    /// message is reported at most once per page.
    pub fn on_new_node(&self, node: ElementRef<'_>) -> Vec<ButtonPlacement> {
        let Some(set) = self.selectors else {
            return Vec::new();
        };

        let all = self.message_elements();
        let mut placements = Vec::new();
        for (index, message) in all.iter().enumerate() {
            let under_node = message.id() == node.id()
                || message.ancestors().any(|ancestor| ancestor.id() == node.id());
            if !under_node || has_save_button(message) || is_streaming(message) {
                continue;
            }

            let key = message_key(message);
            if !self.attached.borrow_mut().insert(key.clone()) {
                continue;
            }

            placements.push(ButtonPlacement {
                message_key: key,
                role: crate::extractor::detect_role(message, set),
                index,
            });
        }

        if !placements.is_empty() {
            debug!("Attaching {} save button(s)", placements.len());
        }
        placements
    }

    /// Number of messages that received a save button during this page load
    pub fn attached_count(&self) -> usize {
        self.attached.borrow().len()
    }

    /// Conversation title with service suffixes removed. `None` when the page
    /// only shows a generic title.
    pub fn title(&self) -> Option<String> {
        let set = self.selectors?;
        for candidate in set.candidates(SelectorRole::Title) {
            let Some(selector) = selectors::parse(candidate) else {
                continue;
            };
            for element in self.root().select(&selector) {
                if let Some(title) = clean_title(&dom::text_content(element)) {
                    return Some(title);
                }
            }
        }
        None
    }
}

fn has_save_button(element: &ElementRef<'_>) -> bool {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|el| dom::has_class(&el, SAVE_BUTTON_CLASS))
}

fn is_streaming(element: &ElementRef<'_>) -> bool {
    std::iter::once(*element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|el| el.value().attr("data-is-streaming") == Some("true"))
}

/// Stable identity for a message element
pub fn message_key(element: &ElementRef<'_>) -> String {
    for attr in ["data-message-id", "id"] {
        match element.value().attr(attr) {
            Some(value) if !value.is_empty() => return value.to_string(),
            _ => {}
        }
    }
    format!("msg-{}", short_hash(&element.html()))
}

const TITLE_SUFFIXES: &[&str] = &[" - ChatGPT", " | ChatGPT", " - Claude", " | Claude", " - Gemini", " | Gemini"];
const GENERIC_TITLES: &[&str] = &["chatgpt", "claude", "gemini", "google gemini", "new chat", "google ai studio"];

fn clean_title(raw: &str) -> Option<String> {
    let mut title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    for suffix in TITLE_SUFFIXES {
        if let Some(stripped) = title.strip_suffix(suffix) {
            title = stripped.trim().to_string();
        }
    }
    if title.is_empty() || GENERIC_TITLES.contains(&title.to_lowercase().as_str()) {
        None
    } else {
        Some(title)
    }
}

/// A node-granular selection range over document order.
///
/// Positions count every node (elements, text, comments) in preorder below
/// the document root, which is position 0. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSelection {
    pub start: usize,
    pub end: usize,
}

impl TextSelection {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// From the first text node containing `start_text` to the first text
    /// node at or after it containing `end_text`
    pub fn between_text(ctx: &PageContext, start_text: &str, end_text: &str) -> Option<Self> {
        let texts: Vec<(usize, String)> = ctx
            .root()
            .descendants()
            .enumerate()
            .filter_map(|(pos, node)| match node.value() {
                Node::Text(text) => Some((pos, text.text.to_string())),
                _ => None,
            })
            .collect();

        let (start, _) = texts.iter().find(|(_, text)| text.contains(start_text))?;
        let (end, _) = texts
            .iter()
            .find(|(pos, text)| pos >= start && text.contains(end_text))?;
        Some(Self::new(*start, *end))
    }

    /// From the first to the last element matching `css`, inclusive of the
    /// last element's subtree. `Ok(None)` when nothing matches.
    pub fn covering(ctx: &PageContext, css: &str) -> Result<Option<Self>, ClipError> {
        let selector =
            scraper::Selector::parse(css).map_err(|_| ClipError::InvalidSelector(css.to_string()))?;
        let root = ctx.root();
        let matches: Vec<ElementRef<'_>> = root.select(&selector).collect();
        let (Some(first), Some(last)) = (matches.first(), matches.last()) else {
            return Ok(None);
        };

        let start = dom::span_of(root, first).map(|(start, _)| start);
        let end = dom::span_of(root, last).map(|(_, end)| end);
        Ok(start.zip(end).map(|(start, end)| Self::new(start, end)))
    }

    /// DOM `Range.intersectsNode` for an element of the page
    pub fn intersects(&self, ctx: &PageContext, element: &ElementRef<'_>) -> bool {
        match dom::span_of(ctx.root(), element) {
            Some((first, last)) => first <= self.end && last >= self.start,
            None => false,
        }
    }

    /// HTML of the selected range: fully selected nodes are copied whole,
    /// partially selected elements contribute only their selected children.
    pub fn clone_contents(&self, ctx: &PageContext) -> String {
        let mut out = String::new();
        self.clone_within(ctx.root(), 0, &mut out);
        out
    }

    fn clone_within(&self, element: ElementRef<'_>, position: usize, out: &mut String) {
        let mut child_position = position + 1;
        for child in element.children() {
            let size = child.descendants().count();
            let (first, last) = (child_position, child_position + size - 1);
            child_position += size;

            if last < self.start || first > self.end {
                continue;
            }
            let fully_selected = first >= self.start && last <= self.end;

            match child.value() {
                Node::Text(text) => out.push_str(&dom::escape_text(&text.text)),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        if fully_selected {
                            dom::write_element(child, out, &|_: &ElementRef<'_>| None);
                        } else {
                            self.clone_within(child, first, out);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHATGPT_PAGE: &str = r#"<html><head><title>Rust lifetimes - ChatGPT</title></head><body>
        <main>
          <div data-message-author-role="user" data-message-id="u1"><div class="whitespace-pre-wrap">What is a lifetime?</div></div>
          <div data-message-author-role="assistant" data-message-id="a1"><div class="markdown"><p>A lifetime is a region.</p></div></div>
          <div data-message-author-role="user" data-message-id="u2"><div class="whitespace-pre-wrap">Thanks</div></div>
        </main></body></html>"#;

    #[test]
    fn test_context_detects_service() {
        let ctx = PageContext::new("https://chatgpt.com/c/abc", CHATGPT_PAGE);
        assert_eq!(ctx.service(), Service::ChatGpt);
        assert!(ctx.selectors().is_some());
        assert!(ctx.require_selectors().is_ok());
    }

    #[test]
    fn test_unsupported_context() {
        let ctx = PageContext::new("https://example.com/", CHATGPT_PAGE);
        assert_eq!(ctx.service(), Service::Unsupported);
        assert!(ctx.message_elements().is_empty());
        assert!(matches!(
            ctx.require_selectors(),
            Err(ClipError::UnsupportedService(_))
        ));
    }

    #[test]
    fn test_message_elements_in_document_order() {
        let ctx = PageContext::new("https://chatgpt.com/c/abc", CHATGPT_PAGE);
        let keys: Vec<String> = ctx.message_elements().iter().map(message_key).collect();
        assert_eq!(keys, vec!["u1", "a1", "u2"]);
    }

    #[test]
    fn test_message_elements_fallback_container() {
        let page = r#"<html><body>
            <div class="group"><p>first</p></div>
            <div class="group"><p>second</p></div>
        </body></html>"#;
        let ctx = PageContext::new("https://chatgpt.com/", page);
        assert_eq!(ctx.message_elements().len(), 2);
    }

    #[test]
    fn test_nested_matches_are_collapsed() {
        let page = r#"<html><body>
            <div class="group"><div class="group"><p>inner</p></div></div>
        </body></html>"#;
        let ctx = PageContext::new("https://chatgpt.com/", page);
        assert_eq!(ctx.message_elements().len(), 1);
    }

    #[test]
    fn test_title_strips_service_suffix() {
        let ctx = PageContext::new("https://chatgpt.com/c/abc", CHATGPT_PAGE);
        assert_eq!(ctx.title(), Some("Rust lifetimes".to_string()));
    }

    #[test]
    fn test_generic_title_is_ignored() {
        let page = "<html><head><title>ChatGPT</title></head><body></body></html>";
        let ctx = PageContext::new("https://chatgpt.com/", page);
        assert_eq!(ctx.title(), None);
    }

    #[test]
    fn test_on_new_node_reports_each_message_once() {
        let ctx = PageContext::new("https://chatgpt.com/c/abc", CHATGPT_PAGE);
        let main = ctx
            .root()
            .select(&scraper::Selector::parse("main").unwrap())
            .next()
            .unwrap();

        let placements = ctx.on_new_node(main);
        assert_eq!(placements.len(), 3);
        assert_eq!(placements[0].role, Role::User);
        assert_eq!(placements[1].role, Role::Assistant);
        assert_eq!(placements[1].index, 1);

        assert!(ctx.on_new_node(main).is_empty());
        assert_eq!(ctx.attached_count(), 3);
    }

    #[test]
    fn test_on_new_node_skips_existing_buttons_and_streaming() {
        let page = r#"<html><body>
            <div data-message-author-role="assistant" data-message-id="a1"><div class="markdown">done</div><button class="ai-clipper-save-btn">Save</button></div>
            <div data-message-author-role="assistant" data-message-id="a2" data-is-streaming="true"><div class="markdown">typing</div></div>
        </body></html>"#;
        let ctx = PageContext::new("https://chatgpt.com/", page);
        assert!(ctx.on_new_node(ctx.root()).is_empty());
    }

    #[test]
    fn test_selection_between_text() {
        let ctx = PageContext::new("https://chatgpt.com/c/abc", CHATGPT_PAGE);
        let selection = TextSelection::between_text(&ctx, "lifetime is", "Thanks").unwrap();

        let messages = ctx.message_elements();
        assert!(!selection.intersects(&ctx, &messages[0]));
        assert!(selection.intersects(&ctx, &messages[1]));
        assert!(selection.intersects(&ctx, &messages[2]));
    }

    #[test]
    fn test_selection_covering_and_clone() {
        let ctx = PageContext::new("https://chatgpt.com/c/abc", CHATGPT_PAGE);
        let selection = TextSelection::covering(&ctx, ".markdown p").unwrap().unwrap();
        assert_eq!(selection.clone_contents(&ctx), "<p>A lifetime is a region.</p>");
    }

    #[test]
    fn test_selection_covering_invalid_selector() {
        let ctx = PageContext::new("https://chatgpt.com/c/abc", CHATGPT_PAGE);
        assert!(TextSelection::covering(&ctx, "[[").is_err());
        assert_eq!(TextSelection::covering(&ctx, ".missing").unwrap(), None);
    }
}
