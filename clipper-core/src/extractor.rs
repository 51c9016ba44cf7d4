//! Message extraction from a single message element.
//!
//! Works on a clone of the element's content root so the page document is
//! never touched. Inside the clone, code blocks are tagged with their
//! language, math is wrapped in `$`/`$$` delimiters, and injected save
//! buttons are dropped. The conversion engine relies on those tags.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, warn};

use crate::dom::{self, Edit};
use crate::page::SAVE_BUTTON_CLASS;
use crate::selectors::{self, SelectorRole, SelectorSet};
use crate::types::{ExtractionError, Message, Role};

/// Attribute carrying the detected language of a code block
pub const LANG_ATTRIBUTE: &str = "data-clipper-lang";

/// Attribute marking math that already carries its `$` delimiters
pub const MATH_ATTRIBUTE: &str = "data-clipper-math";

lazy_static! {
    static ref LANGUAGE_CLASS: Regex = Regex::new(r"language-(\w+)").unwrap();
}

/// Tags that can never hold message content
const NON_CONTENT_TAGS: &[&str] = &["script", "style", "template", "noscript", "svg", "button"];

/// Media that counts as content even without text
const MEDIA_TAGS: &[&str] = &["img", "video", "audio", "picture", "canvas", "iframe"];

/// Extract one message. `None` means "skip this element".
pub fn extract_single(element: ElementRef<'_>, set: &SelectorSet) -> Option<Message> {
    match try_extract(element, set) {
        Ok(message) => Some(message),
        Err(ExtractionError::Empty) => {
            debug!("Skipping empty message element");
            None
        }
        Err(e) => {
            warn!("Skipping message element: {}", e);
            None
        }
    }
}

/// Extract one message, reporting why an element was skipped
pub fn try_extract(element: ElementRef<'_>, set: &SelectorSet) -> Result<Message, ExtractionError> {
    let role = detect_role(&element, set);
    let root = content_root(element, set)?;

    // Snapshot of the content root; everything below reads only the clone.
    extract_html(&root.inner_html(), role, set)
}

/// Build a message from detached HTML (a content root or a selected
/// range), applying the same code, math and save-button cleanup
pub fn extract_html(html: &str, role: Role, set: &SelectorSet) -> Result<Message, ExtractionError> {
    let clone = Html::parse_fragment(html);
    let fragment = clone.root_element();
    let edit_for = plan_edits(fragment, set);

    let mut content = String::new();
    dom::write_children(fragment, &mut content, &edit_for);

    if !has_visible_content(&content) {
        return Err(ExtractionError::Empty);
    }

    Ok(Message::new(role, content))
}

/// Determine the author of a message element.
///
/// An explicit role attribute wins. Otherwise the element is tested against
/// the user and assistant candidates; anything ambiguous is an assistant.
pub fn detect_role(element: &ElementRef<'_>, set: &SelectorSet) -> Role {
    if let Some(attribute) = set.role_attribute {
        let explicit = element
            .descendants()
            .filter_map(ElementRef::wrap)
            .find_map(|el| el.value().attr(attribute).and_then(Role::from_attribute));
        if let Some(role) = explicit {
            return role;
        }
    }

    let user = selectors::contains_any(*element, set.candidates(SelectorRole::UserMessage));
    let assistant = selectors::contains_any(*element, set.candidates(SelectorRole::AssistantMessage));
    match (user, assistant) {
        (true, false) => Role::User,
        _ => Role::Assistant,
    }
}

/// First content candidate inside the element, else the element itself
fn content_root<'a>(
    element: ElementRef<'a>,
    set: &SelectorSet,
) -> Result<ElementRef<'a>, ExtractionError> {
    let name = element.value().name();
    if NON_CONTENT_TAGS.contains(&name) || dom::has_class(&element, SAVE_BUTTON_CLASS) {
        return Err(ExtractionError::NoContentRoot(name.to_string()));
    }

    Ok(selectors::first_match(element, set.candidates(SelectorRole::Content))
        .into_iter()
        .next()
        .unwrap_or(element))
}

/// Collect the edits to apply while serializing the clone
fn plan_edits(
    fragment: ElementRef<'_>,
    set: &SelectorSet,
) -> impl for<'r, 's> Fn(&'r ElementRef<'s>) -> Option<Edit> {
    let mut edits = HashMap::new();

    // Display math first so an inline match nested inside it is ignored.
    for el in selectors::first_match(fragment, set.candidates(SelectorRole::BlockMath)) {
        edits.insert(el.id(), math_edit(el, true));
    }
    for el in selectors::first_match(fragment, set.candidates(SelectorRole::InlineMath)) {
        edits.entry(el.id()).or_insert_with(|| math_edit(el, false));
    }

    for el in selectors::first_match(fragment, set.candidates(SelectorRole::CodeBlock)) {
        edits
            .entry(el.id())
            .or_insert_with(|| Edit::SetAttribute(LANG_ATTRIBUTE, detect_language(el)));
    }

    for el in fragment.descendants().filter_map(ElementRef::wrap) {
        if dom::has_class(&el, SAVE_BUTTON_CLASS) {
            edits.insert(el.id(), Edit::Remove);
        }
    }

    move |el: &ElementRef<'_>| edits.get(&el.id()).cloned()
}

fn math_edit(element: ElementRef<'_>, display: bool) -> Edit {
    let tex = tex_source(element);
    let tex = strip_delimiters(tex.trim());
    if tex.is_empty() {
        return Edit::Remove;
    }

    let tex = dom::escape_text(tex);
    if display {
        Edit::Replace(format!("<div {}=\"block\">$${}$$</div>", MATH_ATTRIBUTE, tex))
    } else {
        Edit::Replace(format!("<span {}=\"inline\">${}$</span>", MATH_ATTRIBUTE, tex))
    }
}

/// TeX for a math node: `data-math`, then a KaTeX TeX annotation, then text
fn tex_source(element: ElementRef<'_>) -> String {
    if let Some(tex) = element.value().attr("data-math") {
        return tex.to_string();
    }

    let annotation = element
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| {
            el.value().name() == "annotation"
                && el.value().attr("encoding") == Some("application/x-tex")
        });
    match annotation {
        Some(annotation) => dom::text_content(annotation),
        None => dom::text_content(element),
    }
}

fn strip_delimiters(tex: &str) -> &str {
    let stripped = tex.trim_start_matches('$').trim_end_matches('$');
    if stripped.len() < tex.len() {
        stripped.trim()
    } else {
        tex
    }
}

/// Language from a `language-*` class or an explicit attribute on the code
/// block or anything inside it. Empty when unknown.
pub fn detect_language(element: ElementRef<'_>) -> String {
    for el in element.descendants().filter_map(ElementRef::wrap) {
        for class in el.value().classes() {
            if let Some(caps) = LANGUAGE_CLASS.captures(class) {
                return caps[1].to_lowercase();
            }
        }
        for attr in ["data-language", "lang", LANG_ATTRIBUTE] {
            if let Some(lang) = el.value().attr(attr) {
                let lang = lang.trim();
                if !lang.is_empty() {
                    return lang.to_lowercase();
                }
            }
        }
    }
    String::new()
}

fn has_visible_content(html: &str) -> bool {
    let parsed = Html::parse_fragment(html);
    let root = parsed.root_element();
    if root.text().any(|text| !text.trim().is_empty()) {
        return true;
    }
    root.descendants()
        .filter_map(ElementRef::wrap)
        .any(|el| MEDIA_TAGS.contains(&el.value().name()))
}
