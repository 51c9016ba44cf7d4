//! Base HTML to Markdown transformer.
//!
//! Handles every element no custom rule claimed: headings, paragraphs,
//! breaks, emphasis, links, images, blockquotes, tables and generic
//! containers. Lists are rendered flat here; nesting is the `List` rule's
//! job.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::ElementRef;

use super::MarkdownConverter;

/// Stand-in for a hard line break until trailing whitespace is normalised
pub(super) const HARD_BREAK: char = '\u{E000}';

/// Elements rendered as their own paragraph-separated block
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "details", "dialog", "div", "fieldset", "figcaption", "figure",
    "footer", "form", "header", "hgroup", "main", "nav", "p", "section", "summary",
];

/// Elements whose content never reaches the note
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "svg", "noscript", "template", "head", "title", "meta", "link", "iframe",
    "canvas",
];

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"[ \t\n\r\x0C]+").unwrap();
    static ref ORDERED_PREFIX: Regex = Regex::new(r"^(\d+)\. ").unwrap();
}

/// Render an element no custom rule matched
pub(super) fn render_element(converter: &MarkdownConverter, element: ElementRef<'_>) -> String {
    let name = element.value().name();

    if DROPPED_TAGS.contains(&name) {
        return String::new();
    }

    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let text = single_line(&converter.render_children(element));
            if text.is_empty() {
                return String::new();
            }
            block(&format!("{} {}", "#".repeat(level), text))
        }
        "br" => format!("{}\n", HARD_BREAK),
        "hr" => block("---"),
        "strong" | "b" => delimit(&converter.render_children(element), "**"),
        "em" | "i" => delimit(&converter.render_children(element), "*"),
        "del" | "s" | "strike" => delimit(&converter.render_children(element), "~~"),
        "a" => render_link(converter, element),
        "img" => render_image(element),
        "blockquote" => render_blockquote(converter, element),
        "table" => render_table(converter, element),
        "pre" => render_plain_pre(element),
        "code" => {
            let code: String = element.text().collect();
            code_span(&code.replace('\n', " "))
        }
        "ul" | "ol" => block(converter.render_children(element).trim()),
        "li" => format!("- {}\n", converter.render_children(element).trim()),
        "input" => match element.value().attr("type") {
            Some(kind) if kind.eq_ignore_ascii_case("checkbox") => {
                if element.value().attr("checked").is_some() {
                    "[x] ".to_string()
                } else {
                    "[ ] ".to_string()
                }
            }
            _ => String::new(),
        },
        _ if BLOCK_TAGS.contains(&name) => block(converter.render_children(element).trim()),
        _ => converter.render_children(element),
    }
}

/// Surround content with paragraph breaks. Empty content yields nothing.
pub(super) fn block(content: &str) -> String {
    if content.trim().is_empty() {
        String::new()
    } else {
        format!("\n\n{}\n\n", content)
    }
}

/// Collapse whitespace and escape Markdown syntax in a text node
pub(super) fn text(raw: &str) -> String {
    escape(&WHITESPACE.replace_all(raw, " "))
}

/// Backslash-escape characters Markdown would otherwise interpret.
///
/// Underscores inside a word (`snake_case`) are left alone.
pub(super) fn escape(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\\' | '*' | '`' | '[' | ']' => {
                out.push('\\');
                out.push(c);
            }
            '_' => {
                let before = i.checked_sub(1).map(|j| chars[j].is_alphanumeric());
                let after = chars.get(i + 1).map(|next| next.is_alphanumeric());
                if before == Some(true) && after == Some(true) {
                    out.push('_');
                } else {
                    out.push_str("\\_");
                }
            }
            _ => out.push(c),
        }
    }

    escape_line_start(out)
}

fn escape_line_start(text: String) -> String {
    if let Some(caps) = ORDERED_PREFIX.captures(&text) {
        let digits = caps[1].len();
        return format!("{}\\{}", &text[..digits], &text[digits..]);
    }
    for prefix in ["# ", "## ", "### ", "> ", "- ", "+ "] {
        if text.starts_with(prefix) {
            return format!("\\{}", text);
        }
    }
    text
}

/// Wrap inline content in a delimiter, keeping surrounding whitespace
/// outside the delimiters
pub(super) fn delimit(content: &str, delimiter: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return content.to_string();
    }
    let leading = if content.starts_with(char::is_whitespace) { " " } else { "" };
    let trailing = if content.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{leading}{delimiter}{trimmed}{delimiter}{trailing}")
}

/// Inline code span, widening the delimiter past backticks in the code
pub(super) fn code_span(code: &str) -> String {
    if code.is_empty() {
        return String::new();
    }
    let delimiter = "`".repeat(longest_run(code, '`') + 1);
    if code.starts_with('`') || code.ends_with('`') {
        format!("{delimiter} {code} {delimiter}")
    } else {
        format!("{delimiter}{code}{delimiter}")
    }
}

/// Fenced code block; the fence is longer than any backtick run in `code`
pub(super) fn fenced(code: &str, language: &str) -> String {
    let code = code.strip_suffix('\n').unwrap_or(code);
    let fence = "`".repeat((longest_run(code, '`') + 1).max(3));
    format!("\n\n{fence}{language}\n{code}\n{fence}\n\n")
}

pub(super) fn longest_run(text: &str, target: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == target {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn single_line(content: &str) -> String {
    WHITESPACE
        .replace_all(&content.replace(HARD_BREAK, ""), " ")
        .trim()
        .to_string()
}

fn render_plain_pre(element: ElementRef<'_>) -> String {
    let code: String = element.text().collect();
    fenced(&code, "")
}

fn render_link(converter: &MarkdownConverter, element: ElementRef<'_>) -> String {
    let content = converter.render_children(element);
    let Some(href) = element.value().attr("href").map(str::trim) else {
        return content;
    };
    if href.is_empty() || href.starts_with("javascript:") {
        return content;
    }

    let label = match single_line(&content) {
        label if label.is_empty() => escape(href),
        label => label,
    };
    let href = href.replace(' ', "%20").replace('(', "%28").replace(')', "%29");
    match element.value().attr("title").filter(|t| !t.is_empty()) {
        Some(title) => format!("[{label}]({href} \"{}\")", title.replace('"', "\\\"")),
        None => format!("[{label}]({href})"),
    }
}

pub(super) fn render_image(element: ElementRef<'_>) -> String {
    let Some(src) = element.value().attr("src").filter(|s| !s.trim().is_empty()) else {
        return String::new();
    };
    let alt = escape(&single_line(element.value().attr("alt").unwrap_or("")));
    let src = src.trim().replace(' ', "%20");
    match element.value().attr("title").filter(|t| !t.is_empty()) {
        Some(title) => format!("![{alt}]({src} \"{}\")", title.replace('"', "\\\"")),
        None => format!("![{alt}]({src})"),
    }
}

fn render_blockquote(converter: &MarkdownConverter, element: ElementRef<'_>) -> String {
    let inner = tidy_fragment(&converter.render_children(element));
    if inner.is_empty() {
        return String::new();
    }
    let quoted: Vec<String> = inner
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect();
    block(&quoted.join("\n"))
}

fn render_table(converter: &MarkdownConverter, element: ElementRef<'_>) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut header_found = false;

    for row in element
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr")
    {
        // Rows of a nested table belong to that table
        let owner = row
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "table");
        if owner.map(|table| table.id()) != Some(element.id()) {
            continue;
        }

        let cells: Vec<ElementRef<'_>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| matches!(cell.value().name(), "th" | "td"))
            .collect();
        if cells.is_empty() {
            continue;
        }

        let is_header = cells.iter().all(|cell| cell.value().name() == "th")
            || row
                .parent()
                .and_then(ElementRef::wrap)
                .map(|parent| parent.value().name() == "thead")
                .unwrap_or(false);

        let rendered: Vec<String> = cells
            .iter()
            .map(|cell| single_line(&converter.render_children(*cell)).replace('|', "\\|"))
            .collect();

        if is_header && !header_found && rows.is_empty() {
            header_found = true;
        }
        rows.push(rendered);
    }

    if rows.is_empty() {
        return String::new();
    }

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if !header_found {
        // GFM needs a header row
        rows.insert(0, vec![String::new(); columns]);
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, mut row) in rows.into_iter().enumerate() {
        row.resize(columns, String::new());
        lines.push(format!("| {} |", row.join(" | ")));
        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(columns)));
        }
    }
    block(&lines.join("\n"))
}

/// Final cleanup of converted output.
///
/// Outside fenced code: trailing whitespace is removed (hard breaks become
/// two spaces), runs of spaces after the indentation collapse to one except
/// inside code spans, and blank lines collapse to at most one. Fenced code
/// is copied verbatim.
pub(super) fn normalize(markdown: &str) -> String {
    tidy(markdown, false)
}

/// [`normalize`] for a fragment that will be embedded in more output.
/// Hard breaks stay pending so the outer pass still sees them.
pub(super) fn tidy_fragment(markdown: &str) -> String {
    tidy(markdown, true)
}

/// An open fenced code block: fence character, fence length and the
/// blockquote depth it was opened at
#[derive(Clone, Copy)]
struct Fence {
    marker: char,
    len: usize,
    depth: usize,
}

fn tidy(markdown: &str, keep_breaks: bool) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut fence: Option<Fence> = None;

    for line in markdown.split('\n') {
        let (depth, body) = strip_quote_markers(line);

        if let Some(open) = fence {
            out.push(line.to_string());
            let run = body.chars().take_while(|c| *c == open.marker).count();
            if depth == open.depth
                && run >= open.len
                && body[run * open.marker.len_utf8()..].trim().is_empty()
            {
                fence = None;
            }
            continue;
        }

        if let Some(marker) = ['`', '~'].into_iter().find(|m| body.starts_with(*m)) {
            let run = body.chars().take_while(|c| *c == marker).count();
            if run >= 3 {
                fence = Some(Fence { marker, len: run, depth });
                out.push(line.trim_end().to_string());
                continue;
            }
        }

        let line = collapse_spaces(line);
        let mut line = line.trim_end().to_string();
        if line.ends_with(HARD_BREAK) {
            line = line.replace(HARD_BREAK, "");
            let content = line.trim_end().to_string();
            line = if content.trim().is_empty() {
                String::new()
            } else if keep_breaks {
                format!("{content}{HARD_BREAK}")
            } else {
                format!("{content}  ")
            };
        } else {
            line = line.replace(HARD_BREAK, "");
        }

        if line.is_empty() && out.last().map(|prev| prev.is_empty()).unwrap_or(true) {
            continue;
        }
        out.push(line);
    }

    out.join("\n").trim().to_string()
}

/// Blockquote depth of a line and the text after its `>` markers
fn strip_quote_markers(line: &str) -> (usize, &str) {
    let mut depth = 0;
    let mut rest = line.trim_start();
    while let Some(after) = rest.strip_prefix('>') {
        depth += 1;
        rest = after.strip_prefix(' ').unwrap_or(after);
    }
    (depth, rest.trim_start())
}

fn collapse_spaces(line: &str) -> String {
    let indent = line.len() - line.trim_start_matches(' ').len();
    let mut out = String::with_capacity(line.len());
    out.push_str(&line[..indent]);

    let chars: Vec<char> = line[indent..].chars().collect();
    let mut i = 0;
    let mut in_code: Option<usize> = None;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && in_code.is_none() {
            out.push(c);
            if let Some(next) = chars.get(i + 1) {
                out.push(*next);
            }
            i += 2;
            continue;
        }
        if c == '`' {
            let run = chars[i..].iter().take_while(|ch| **ch == '`').count();
            match in_code {
                None => in_code = Some(run),
                Some(open) if open == run => in_code = None,
                Some(_) => {}
            }
            out.extend(std::iter::repeat('`').take(run));
            i += run;
            continue;
        }
        if c == ' ' && in_code.is_none() && out.ends_with(' ') && out.len() > indent {
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}
