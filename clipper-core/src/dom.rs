//! HTML serialization and document-order helpers over `scraper` trees.
//!
//! The extractor never mutates a parsed document. Instead it serializes a
//! clone while applying [`Edit`]s keyed by element, which gives the same
//! result as editing a detached copy.

use scraper::{ElementRef, Node};

/// Change applied to one element while serializing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Drop the element and its subtree
    Remove,
    /// Serialize the element with an extra (or overriding) attribute
    SetAttribute(&'static str, String),
    /// Emit this raw HTML instead of the element
    Replace(String),
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Concatenated text of an element's subtree
pub fn text_content(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Whether the element carries `class` among its classes
pub fn has_class(element: &ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Serialize the children of `element`, applying edits
pub fn write_children<F>(element: ElementRef<'_>, out: &mut String, edit_for: &F)
where
    F: Fn(&ElementRef<'_>) -> Option<Edit>,
{
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(&text.text)),
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(&comment.comment);
                out.push_str("-->");
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, out, edit_for);
                }
            }
            _ => {}
        }
    }
}

/// Serialize one element (outer HTML), applying edits
pub fn write_element<F>(element: ElementRef<'_>, out: &mut String, edit_for: &F)
where
    F: Fn(&ElementRef<'_>) -> Option<Edit>,
{
    let mut extra: Option<(&'static str, String)> = None;
    match edit_for(&element) {
        Some(Edit::Remove) => return,
        Some(Edit::Replace(html)) => {
            out.push_str(&html);
            return;
        }
        Some(Edit::SetAttribute(name, value)) => extra = Some((name, value)),
        None => {}
    }

    let name = element.value().name();
    out.push('<');
    out.push_str(name);
    for (attr, value) in element.value().attrs() {
        if extra.as_ref().map(|(n, _)| *n == attr).unwrap_or(false) {
            continue;
        }
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    if let Some((attr, value)) = &extra {
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');

    if is_void(name) {
        return;
    }

    write_children(element, out, edit_for);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Inner HTML without edits
pub fn inner_html(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_children(element, &mut out, &|_: &ElementRef<'_>| None);
    out
}

/// Preorder span `(first, last)` of `element` relative to `root`, where
/// `root` itself is position 0. `None` if `element` is not under `root`.
pub fn span_of(root: ElementRef<'_>, element: &ElementRef<'_>) -> Option<(usize, usize)> {
    let first = root
        .descendants()
        .position(|node| node.id() == element.id())?;
    let size = element.descendants().count();
    Some((first, first + size - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first<'a>(html: &'a Html, css: &str) -> ElementRef<'a> {
        let selector = Selector::parse(css).unwrap();
        html.select(&selector).next().unwrap()
    }

    #[test]
    fn test_inner_html_roundtrip() {
        let html = Html::parse_fragment(r#"<div><p class="a">x &amp; y</p><br><!-- note --></div>"#);
        let div = first(&html, "div");
        assert_eq!(
            inner_html(div),
            r#"<p class="a">x &amp; y</p><br><!-- note -->"#
        );
    }

    #[test]
    fn test_edits_apply_without_touching_source() {
        let html = Html::parse_fragment(
            r#"<div><button class="x">Save</button><pre>code</pre><span id="m">m</span></div>"#,
        );
        let div = first(&html, "div");
        let button = first(&html, "button").id();
        let pre = first(&html, "pre").id();
        let span = first(&html, "span").id();

        let mut out = String::new();
        write_children(div, &mut out, &|el: &ElementRef<'_>| {
            if el.id() == button {
                Some(Edit::Remove)
            } else if el.id() == pre {
                Some(Edit::SetAttribute("data-lang", "rust".to_string()))
            } else if el.id() == span {
                Some(Edit::Replace("$m$".to_string()))
            } else {
                None
            }
        });

        assert_eq!(out, r#"<pre data-lang="rust">code</pre>$m$"#);
        // Source tree still holds the button
        assert!(inner_html(div).contains("<button"));
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_attr(r#"say "hi""#), "say &quot;hi&quot;");
    }

    #[test]
    fn test_span_of() {
        let html = Html::parse_fragment("<div><p>a</p><p>b</p></div>");
        let root = html.root_element();
        let div = first(&html, "div");
        let (start, end) = span_of(root, &div).unwrap();
        // div, p, "a", p, "b"
        assert_eq!(end - start, 4);
    }
}
