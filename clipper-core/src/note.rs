//! Note assembly: converted messages plus template, frontmatter and path

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::config::MarkdownConfig;
use crate::dom;
use crate::markdown::MarkdownConverter;
use crate::page::PageContext;
use crate::selectors::{self, SelectorRole};
use crate::service::Service;
use crate::types::{Message, Role};

pub use crate::config::DEFAULT_TEMPLATE;

lazy_static! {
    static ref UNSAFE_PATH_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|#^\[\]\x00-\x1F]"#).unwrap();
    static ref SPACES: Regex = Regex::new(r"\s+").unwrap();
}

/// Longest file title kept in a suggested path
const MAX_TITLE_CHARS: usize = 80;

/// Header text per speaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerLabels {
    pub user: String,
    pub assistant: String,
}

impl Default for SpeakerLabels {
    fn default() -> Self {
        Self {
            user: "User".to_string(),
            assistant: "Assistant".to_string(),
        }
    }
}

impl SpeakerLabels {
    pub fn for_role(&self, role: Role) -> &str {
        match role {
            Role::User => &self.user,
            Role::Assistant => &self.assistant,
        }
    }
}

/// How a message list is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownOptions {
    pub include_timestamp: bool,
    pub speaker_labels: SpeakerLabels,
    pub separator: String,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            include_timestamp: false,
            speaker_labels: SpeakerLabels::default(),
            separator: "\n\n---\n\n".to_string(),
        }
    }
}

impl MarkdownOptions {
    /// Options from the `[markdown]` config table. The assistant is labelled
    /// with the service name unless configured otherwise.
    pub fn from_config(config: &MarkdownConfig, service: Service) -> Self {
        let assistant = config.assistant_label.clone().unwrap_or_else(|| {
            if service.is_supported() {
                service.display_name().to_string()
            } else {
                "Assistant".to_string()
            }
        });
        Self {
            include_timestamp: config.include_timestamp,
            speaker_labels: SpeakerLabels {
                user: config.user_label.clone(),
                assistant,
            },
            separator: config.separator.clone(),
        }
    }
}

/// Render messages as one Markdown body
pub fn messages_to_markdown(messages: &[Message], options: &MarkdownOptions) -> String {
    let converter = MarkdownConverter::default();
    messages
        .iter()
        .map(|message| message_section(message, options, &converter))
        .collect::<Vec<_>>()
        .join(&options.separator)
}

fn message_section(message: &Message, options: &MarkdownOptions, converter: &MarkdownConverter) -> String {
    let mut header = format!("### {}", options.speaker_labels.for_role(message.role));
    if let (Some(part), Some(total)) = (message.part, message.total_parts) {
        if total > 1 {
            header.push_str(&format!(" (part {}/{})", part, total));
        }
    }

    let mut section = header;
    if options.include_timestamp && !message.timestamp.is_empty() {
        section.push_str(&format!("\n\n*{}*", message.timestamp));
    }

    let body = converter.convert(&message.content);
    if !body.is_empty() {
        section.push_str("\n\n");
        section.push_str(&body);
    }
    section
}

/// Everything needed to assemble one note
#[derive(Debug, Clone)]
pub struct NoteRequest {
    pub title: String,
    pub url: String,
    pub messages: Vec<Message>,
    pub service: Service,
    pub template: String,
    pub include_metadata: bool,
    pub auto_tagging: bool,
    pub date: NaiveDate,
    pub options: MarkdownOptions,
}

impl NoteRequest {
    /// Request with the default template and today's date
    pub fn new(title: impl Into<String>, url: impl Into<String>, service: Service, messages: Vec<Message>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            messages,
            service,
            template: DEFAULT_TEMPLATE.to_string(),
            include_metadata: true,
            auto_tagging: true,
            date: chrono::Local::now().date_naive(),
            options: MarkdownOptions::default(),
        }
    }
}

/// Fill the template and prepend frontmatter.
///
/// Tokens are substituted in the order `{url}`, `{title}`, `{content}`,
/// `{date}`, `{service}`, each replacing only its first occurrence. A value
/// that itself contains a later token gets that token substituted too.
/// Frontmatter is only added when the template is exactly the default one.
pub fn create_obsidian_note(request: &NoteRequest) -> String {
    let content = messages_to_markdown(&request.messages, &request.options);
    let date = request.date.format("%Y-%m-%d").to_string();

    let mut note = request.template.clone();
    for (token, value) in [
        ("{url}", request.url.as_str()),
        ("{title}", request.title.as_str()),
        ("{content}", content.as_str()),
        ("{date}", date.as_str()),
        ("{service}", request.service.display_name()),
    ] {
        note = note.replacen(token, value, 1);
    }

    if request.include_metadata && request.template == DEFAULT_TEMPLATE {
        debug!("Default template, adding frontmatter");
        note = format!("{}{}", frontmatter(request, &date), note);
    }
    note
}

fn frontmatter(request: &NoteRequest, date: &str) -> String {
    let mut lines = vec![
        "---".to_string(),
        format!("title: {}", yaml_scalar(&request.title)),
        format!("date: {}", date),
        format!("service: {}", request.service.display_name()),
        format!("url: {}", request.url),
    ];
    if request.auto_tagging {
        lines.push(format!("tags: [ai-chat, {}]", request.service.as_str()));
    }
    lines.push("---".to_string());
    format!("{}\n\n", lines.join("\n"))
}

/// Quote a value when YAML would otherwise misread it
fn yaml_scalar(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.contains(": ")
        || value.contains(" #")
        || value.starts_with(|c: char| "-?:,[]{}#&*!|>'\"%@`".contains(c));
    if needs_quotes {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// `<folder>/<YYYY-MM-DD> <title>.md` with characters illegal in file
/// names removed
pub fn suggested_path(folder: &str, title: &str, date: NaiveDate) -> String {
    let cleaned = UNSAFE_PATH_CHARS.replace_all(title, " ");
    let mut cleaned = SPACES.replace_all(&cleaned, " ").trim().trim_matches('.').trim().to_string();
    if cleaned.chars().count() > MAX_TITLE_CHARS {
        cleaned = cleaned.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string();
    }
    if cleaned.is_empty() {
        cleaned = "Untitled".to_string();
    }

    let file = format!("{} {}.md", date.format("%Y-%m-%d"), cleaned);
    let folder = folder.trim().trim_matches('/');
    if folder.is_empty() {
        file
    } else {
        format!("{}/{}", folder, file)
    }
}

/// Note title: the page title, else the opening of the first user
/// message, else "<Service> conversation"
pub fn page_title(ctx: &PageContext) -> String {
    if let Some(title) = ctx.title() {
        return title;
    }

    if let Some(set) = ctx.selectors() {
        let first_user = ctx
            .message_elements()
            .into_iter()
            .filter(|el| crate::extractor::detect_role(el, set) == Role::User)
            .map(|el| {
                let scope = selectors::first_match(el, set.candidates(SelectorRole::Content))
                    .into_iter()
                    .next()
                    .unwrap_or(el);
                SPACES.replace_all(dom::text_content(scope).trim(), " ").to_string()
            })
            .find(|text| !text.is_empty());

        if let Some(text) = first_user {
            return truncate_words(&text, 60);
        }
    }

    let service = if ctx.service().is_supported() {
        ctx.service().display_name()
    } else {
        "Chat"
    };
    format!("{} conversation", service)
}

fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(' ') {
        Some(space) if space > 0 => format!("{}…", cut[..space].trim_end()),
        _ => format!("{}…", cut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message(role: Role, html: &str) -> Message {
        let mut message = Message::new(role, html);
        message.timestamp = "2024-05-01T10:00:00Z".to_string();
        message
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn request(template: &str) -> NoteRequest {
        let mut request = NoteRequest::new(
            "Rust lifetimes",
            "https://chatgpt.com/c/1",
            Service::ChatGpt,
            vec![
                message(Role::User, "<p>What is a lifetime?</p>"),
                message(Role::Assistant, "<p>A <strong>region</strong> of code.</p>"),
            ],
        );
        request.template = template.to_string();
        request.date = date();
        request
    }

    #[test]
    fn test_messages_to_markdown() {
        let messages = vec![
            message(Role::User, "<p>Hi</p>"),
            message(Role::Assistant, "<p>Hello</p>"),
        ];
        let md = messages_to_markdown(&messages, &MarkdownOptions::default());
        assert_eq!(md, "### User\n\nHi\n\n---\n\n### Assistant\n\nHello");
    }

    #[test]
    fn test_timestamp_and_parts() {
        let mut part = message(Role::Assistant, "<p>Long</p>");
        part.part = Some(2);
        part.total_parts = Some(3);

        let options = MarkdownOptions {
            include_timestamp: true,
            separator: "\n\n".to_string(),
            ..MarkdownOptions::default()
        };
        let md = messages_to_markdown(&[part], &options);
        assert_eq!(md, "### Assistant (part 2/3)\n\n*2024-05-01T10:00:00Z*\n\nLong");
    }

    #[test]
    fn test_options_from_config_use_service_name() {
        let options = MarkdownOptions::from_config(&MarkdownConfig::default(), Service::Claude);
        assert_eq!(options.speaker_labels.assistant, "Claude");
        assert_eq!(options.speaker_labels.user, "User");
    }

    #[test]
    fn test_default_template_gets_frontmatter() {
        let note = create_obsidian_note(&request(DEFAULT_TEMPLATE));
        assert_eq!(
            note,
            "---\ntitle: Rust lifetimes\ndate: 2024-05-01\nservice: ChatGPT\nurl: https://chatgpt.com/c/1\ntags: [ai-chat, chatgpt]\n---\n\n\
             https://chatgpt.com/c/1\n\n\
             ### User\n\nWhat is a lifetime?\n\n---\n\n### Assistant\n\nA **region** of code."
        );
    }

    #[test]
    fn test_frontmatter_without_tags() {
        let mut request = request(DEFAULT_TEMPLATE);
        request.auto_tagging = false;
        let note = create_obsidian_note(&request);
        assert!(note.starts_with("---\ntitle: Rust lifetimes\ndate: 2024-05-01\nservice: ChatGPT\nurl: https://chatgpt.com/c/1\n---\n\n"));
    }

    #[test]
    fn test_custom_template_has_no_frontmatter() {
        let note = create_obsidian_note(&request("# {title}\n{date} via {service}\n\n{content}"));
        assert!(note.starts_with("# Rust lifetimes\n2024-05-01 via ChatGPT\n\n### User"));
        assert!(!note.contains("title:"));
    }

    #[test]
    fn test_metadata_disabled() {
        let mut request = request(DEFAULT_TEMPLATE);
        request.include_metadata = false;
        assert!(create_obsidian_note(&request).starts_with("https://chatgpt.com/c/1\n\n### User"));
    }

    #[test]
    fn test_tokens_replaced_once() {
        let note = create_obsidian_note(&request("{title} / {title}"));
        assert_eq!(note, "Rust lifetimes / {title}");
    }

    #[test]
    fn test_substituted_value_can_be_resubstituted() {
        // A title containing a later token picks up that token's value
        let mut request = request("{title}|{date}");
        request.title = "Notes {date}".to_string();
        assert_eq!(create_obsidian_note(&request), "Notes 2024-05-01|{date}");
    }

    #[test]
    fn test_yaml_scalar_quoting() {
        assert_eq!(yaml_scalar("Plain title"), "Plain title");
        assert_eq!(yaml_scalar("Rust: a primer"), "\"Rust: a primer\"");
        assert_eq!(yaml_scalar("[draft]"), "\"[draft]\"");
    }

    #[test]
    fn test_suggested_path() {
        assert_eq!(
            suggested_path("AI Chats", "Rust: lifetimes / borrowing?", date()),
            "AI Chats/2024-05-01 Rust lifetimes borrowing.md"
        );
        assert_eq!(suggested_path("", "  ", date()), "2024-05-01 Untitled.md");
        assert_eq!(suggested_path("/Inbox/", "x", date()), "Inbox/2024-05-01 x.md");
    }

    #[test]
    fn test_page_title_fallbacks() {
        let titled = PageContext::new(
            "https://claude.ai/chat/1",
            "<html><head><title>Borrow checker - Claude</title></head><body></body></html>",
        );
        assert_eq!(page_title(&titled), "Borrow checker");

        let untitled = PageContext::new(
            "https://chatgpt.com/c/1",
            r#"<html><head><title>ChatGPT</title></head><body>
                <div data-message-author-role="user"><div class="whitespace-pre-wrap">  How do   lifetimes work?  </div></div>
            </body></html>"#,
        );
        assert_eq!(page_title(&untitled), "How do lifetimes work?");

        let empty = PageContext::new("https://gemini.google.com/app", "<html><body></body></html>");
        assert_eq!(page_title(&empty), "Gemini conversation");
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("short", 10), "short");
        assert_eq!(truncate_words("one two three four", 10), "one two…");
    }
}
