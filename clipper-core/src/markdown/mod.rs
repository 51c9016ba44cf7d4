//! HTML to Markdown conversion engine.
//!
//! A base transformer ([`base`]) extended with an ordered list of custom
//! [`Rule`]s. For every element the first matching rule renders it;
//! elements no rule claims go to the base transformer. Conversion never
//! fails: html5ever recovers malformed markup and whatever text survives is
//! emitted.

mod base;
mod rules;

pub use rules::Rule;

use scraper::{ElementRef, Html, Node};

/// Stateless converter holding the rule order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownConverter {
    rules: Vec<Rule>,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self {
            rules: Rule::ALL.to_vec(),
        }
    }
}

impl MarkdownConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converter using only `rules`, in the given order
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The rule that renders `element`, if any
    pub fn rule_for(&self, element: &ElementRef<'_>) -> Option<Rule> {
        self.rules.iter().copied().find(|rule| rule.matches(element))
    }

    /// Convert an HTML fragment to Markdown. Empty input gives `""`.
    pub fn convert(&self, html: &str) -> String {
        if html.trim().is_empty() {
            return String::new();
        }
        let fragment = Html::parse_fragment(html);
        base::normalize(&self.render_children(fragment.root_element()))
    }

    pub(crate) fn render_children(&self, element: ElementRef<'_>) -> String {
        let mut out = String::new();
        for child in element.children() {
            let piece = match ElementRef::wrap(child) {
                Some(el) => self.render_element(el),
                None => self.render_leaf(child.value()),
            };
            push_piece(&mut out, &piece);
        }
        out
    }

    pub(crate) fn render_element(&self, element: ElementRef<'_>) -> String {
        match self.rule_for(&element) {
            Some(rule) => rule.render(element, self),
            None => base::render_element(self, element),
        }
    }

    /// Text and comment nodes
    pub(crate) fn render_leaf(&self, node: &Node) -> String {
        match node {
            Node::Text(text) => base::text(&text.text),
            Node::Comment(comment) => format!("<!--{}-->", comment.comment),
            _ => String::new(),
        }
    }
}

/// Append a rendered piece, dropping leading spaces that would follow a
/// line start or another space
fn push_piece(out: &mut String, piece: &str) {
    if out.is_empty() || out.ends_with('\n') || out.ends_with(' ') {
        out.push_str(piece.trim_start_matches(' '));
    } else {
        out.push_str(piece);
    }
}

/// Convert with the default rule set
pub fn convert(html: &str) -> String {
    MarkdownConverter::default().convert(html)
}
