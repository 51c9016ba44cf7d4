//! Custom conversion rules.
//!
//! Rules are evaluated in [`Rule::ALL`] order and the first one whose
//! predicate matches an element renders it. Predicates that could overlap
//! are ordered so the more specific rule comes first: the save-button
//! marker beats generic noise, math beats inline code, and inline code
//! never matches inside `<pre>`.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::ElementRef;

use super::base;
use super::MarkdownConverter;
use crate::dom;
use crate::extractor::{self, LANG_ATTRIBUTE, MATH_ATTRIBUTE};
use crate::page::SAVE_BUTTON_CLASS;

lazy_static! {
    /// Toolbar and action-button wording, Latin plus the localized labels
    /// the chat services ship
    static ref NOISE_KEYWORDS: Regex = Regex::new(
        r"(?i)(copy|download|toolbar|feedback|share|regenerate|retry|read aloud|thumbs|good response|bad response|more actions|复制|拷贝|下载|分享|反馈|重新生成|朗读|コピー|ダウンロード|共有|フィードバック|copiar|descargar|compartir|kopieren|herunterladen|teilen|copier|télécharger|partager|copia|scarica|condividi)"
    ).unwrap();

    /// A rendered line that opens a list item
    static ref LIST_MARKER: Regex = Regex::new(r"^(?:[-+*]|\d+[.)])(?: |$)").unwrap();
}

/// Roles that make an element behave like a button
const BUTTON_ROLES: &[&str] = &["button", "toolbar", "menu", "menuitem"];

/// Labels longer than this are content, not a control caption
const MAX_LABEL_LEN: usize = 40;

/// One custom rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    SaveButton,
    Noise,
    Math,
    CodeBlock,
    InlineCode,
    List,
    DefinitionList,
    CaptionedImage,
}

impl Rule {
    /// Every rule, in evaluation order
    pub const ALL: [Rule; 8] = [
        Rule::SaveButton,
        Rule::Noise,
        Rule::Math,
        Rule::CodeBlock,
        Rule::InlineCode,
        Rule::List,
        Rule::DefinitionList,
        Rule::CaptionedImage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rule::SaveButton => "save-button",
            Rule::Noise => "noise",
            Rule::Math => "math",
            Rule::CodeBlock => "code-block",
            Rule::InlineCode => "inline-code",
            Rule::List => "list",
            Rule::DefinitionList => "definition-list",
            Rule::CaptionedImage => "captioned-image",
        }
    }

    /// Whether this rule claims `element`
    pub fn matches(&self, element: &ElementRef<'_>) -> bool {
        let name = element.value().name();
        match self {
            Rule::SaveButton => dom::has_class(element, SAVE_BUTTON_CLASS),
            Rule::Noise => is_button_like(element) && has_noise_label(element),
            Rule::Math => element.value().attr(MATH_ATTRIBUTE).is_some(),
            Rule::CodeBlock => name == "pre",
            Rule::InlineCode => name == "code" && !inside_pre(element),
            Rule::List => name == "ul" || name == "ol",
            Rule::DefinitionList => name == "dl",
            Rule::CaptionedImage => {
                name == "figure"
                    && first_descendant(element, "img").is_some()
                    && first_descendant(element, "figcaption").is_some()
            }
        }
    }

    /// Markdown for an element this rule matched
    pub fn render(&self, element: ElementRef<'_>, converter: &MarkdownConverter) -> String {
        match self {
            Rule::SaveButton | Rule::Noise => String::new(),
            Rule::Math => render_math(element),
            Rule::CodeBlock => render_code_block(element),
            Rule::InlineCode => {
                let code: String = element.text().collect();
                base::code_span(&code.replace('\n', " "))
            }
            Rule::List => base::block(&render_list(element, converter)),
            Rule::DefinitionList => render_definition_list(element, converter),
            Rule::CaptionedImage => render_figure(element, converter),
        }
    }
}

fn is_button_like(element: &ElementRef<'_>) -> bool {
    if element.value().name() == "button" {
        return true;
    }
    element
        .value()
        .attr("role")
        .map(|role| BUTTON_ROLES.contains(&role.trim().to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn has_noise_label(element: &ElementRef<'_>) -> bool {
    let attrs = ["class", "aria-label", "data-testid", "title"];
    if attrs
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .any(|value| NOISE_KEYWORDS.is_match(value))
    {
        return true;
    }

    let text = dom::text_content(*element);
    let text = text.trim();
    !text.is_empty() && text.chars().count() <= MAX_LABEL_LEN && NOISE_KEYWORDS.is_match(text)
}

fn inside_pre(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "pre")
}

fn first_descendant<'a>(element: &ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == tag)
}

fn render_math(element: ElementRef<'_>) -> String {
    let tex: String = element.text().collect();
    if element.value().attr(MATH_ATTRIBUTE) == Some("block") {
        base::block(tex.trim())
    } else {
        tex
    }
}

fn render_code_block(element: ElementRef<'_>) -> String {
    let language = element
        .value()
        .attr(LANG_ATTRIBUTE)
        .map(|lang| lang.trim().to_lowercase())
        .unwrap_or_else(|| extractor::detect_language(element));

    // Code viewers put line numbers and toolbars next to the <code> element
    let code: String = match first_descendant(&element, "code") {
        Some(code) => code.text().collect(),
        None => element.text().collect(),
    };
    base::fenced(&code, &language)
}

/// Items of one list level. Nested lists are indented four spaces.
fn render_list(list: ElementRef<'_>, converter: &MarkdownConverter) -> String {
    let ordered = list.value().name() == "ol";
    let mut number = list
        .value()
        .attr("start")
        .and_then(|start| start.trim().parse::<i64>().ok())
        .unwrap_or(1);

    let mut items: Vec<String> = Vec::new();
    for child in list.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "li" => {
                let marker = if ordered {
                    let marker = format!("{}.", number);
                    number = number.saturating_add(1);
                    marker
                } else {
                    "-".to_string()
                };
                items.push(render_item(child, &marker, converter));
            }
            // Invalid but common: a sublist directly inside the list
            "ul" | "ol" => items.push(indent(&render_list(child, converter))),
            _ => {}
        }
    }
    items.join("\n")
}

fn render_item(item: ElementRef<'_>, marker: &str, converter: &MarkdownConverter) -> String {
    let mut body = String::new();
    let mut sublists: Vec<String> = Vec::new();

    for child in item.children() {
        match ElementRef::wrap(child) {
            Some(el) if matches!(el.value().name(), "ul" | "ol") => {
                sublists.push(render_list(el, converter));
            }
            Some(el) => {
                if !sublists.is_empty() {
                    // Content after a sublist continues the item
                    body.push_str(&sublists.drain(..).map(|s| format!("\n{}\n", s)).collect::<String>());
                }
                body.push_str(&converter.render_element(el));
            }
            None => body.push_str(&converter.render_leaf(child.value())),
        }
    }

    let body = base::tidy_fragment(&body);
    let mut lines = body.lines().peekable();
    // A list wrapped in a block starts on its own line under the marker
    let nested_first = lines.peek().map(|first| LIST_MARKER.is_match(first)).unwrap_or(false);
    let mut out = if nested_first {
        marker.to_string()
    } else {
        format!("{} {}", marker, lines.next().unwrap_or("").trim_end())
    };
    for line in lines {
        out.push('\n');
        if !line.is_empty() {
            out.push_str(&indent(line));
        }
    }
    for sublist in sublists {
        out.push('\n');
        out.push_str(&indent(&sublist));
    }
    out.trim_end().to_string()
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| if line.is_empty() { String::new() } else { format!("    {}", line) })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Terms and definitions of one list. Only its own `dt`/`dd` children (or
/// those grouped in a `div`) count; a nested list renders inside its `dd`.
fn render_definition_list(list: ElementRef<'_>, converter: &MarkdownConverter) -> String {
    let entries = list.children().filter_map(ElementRef::wrap).flat_map(|child| {
        if child.value().name() == "div" {
            child.children().filter_map(ElementRef::wrap).collect::<Vec<_>>()
        } else {
            vec![child]
        }
    });

    let mut lines: Vec<String> = Vec::new();
    for entry in entries {
        let name = entry.value().name();
        if !matches!(name, "dt" | "dd") {
            continue;
        }
        let content = base::normalize(&converter.render_children(entry))
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if content.is_empty() {
            continue;
        }
        lines.push(if name == "dt" {
            format!("**{}**", content)
        } else {
            format!(": {}", content)
        });
    }
    base::block(&lines.join("\n"))
}

fn render_figure(figure: ElementRef<'_>, converter: &MarkdownConverter) -> String {
    let image = first_descendant(&figure, "img").map(base::render_image).unwrap_or_default();
    let caption = first_descendant(&figure, "figcaption")
        .map(|caption| base::normalize(&converter.render_children(caption)).replace('\n', " "))
        .unwrap_or_default();

    match (image.is_empty(), caption.is_empty()) {
        (true, true) => String::new(),
        (false, true) => base::block(&image),
        (true, false) => base::block(&format!("*{}*", caption)),
        (false, false) => base::block(&format!("{}\n*{}*", image, caption)),
    }
}
