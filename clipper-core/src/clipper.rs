//! End-to-end pipeline: page snapshot in, note out.
//!
//! The synchronous phase (parse, detect, capture, title) runs first and
//! drops the parsed document before anything is awaited, so the futures
//! returned here are `Send`.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::capture::{self, CaptureRequest};
use crate::chunker::{self, Chunker};
use crate::config::{Config, Preferences};
use crate::note::{self, MarkdownOptions, NoteRequest};
use crate::page::{PageContext, TextSelection};
use crate::payload::{ClipRequest, SelectionSpec};
use crate::service::Service;
use crate::types::{ClipError, Message};
use crate::vault::{self, FilesystemTransport, SavedNote, VaultTransport};

/// A finished note, ready for a transport
#[derive(Debug, Clone)]
pub struct ClippedNote {
    pub content: String,
    /// Suggested vault-relative path
    pub filename: String,
    pub title: String,
    pub service: Service,
    /// Messages in the note, counting each split part
    pub message_count: usize,
    /// Matched elements that yielded no message
    pub skipped: usize,
}

/// What the synchronous phase hands to the async one
struct Captured {
    messages: Vec<Message>,
    skipped: usize,
    title: String,
    service: Service,
    preferences: Preferences,
}

/// Runs clip requests against one configuration
pub struct Clipper {
    config: Config,
}

impl Clipper {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the note for `request`. `Ok(None)` means nothing was captured
    /// (an empty selection, or no messages on the page).
    pub async fn clip(&self, request: &ClipRequest) -> Result<Option<ClippedNote>, ClipError> {
        self.clip_on(request, chrono::Local::now().date_naive()).await
    }

    /// [`Clipper::clip`] with a fixed note date
    pub async fn clip_on(&self, request: &ClipRequest, date: NaiveDate) -> Result<Option<ClippedNote>, ClipError> {
        let Some(captured) = self.capture_phase(request)? else {
            return Ok(None);
        };

        let messages = self.split_oversized(captured.messages).await?;
        let message_count = messages.len();

        let mut note_request = NoteRequest::new(
            captured.title.clone(),
            request.url.clone(),
            captured.service,
            messages,
        );
        note_request.template = captured.preferences.template.clone();
        note_request.include_metadata = captured.preferences.include_metadata;
        note_request.auto_tagging = captured.preferences.auto_tagging;
        note_request.date = date;
        note_request.options = MarkdownOptions::from_config(&self.config.markdown, captured.service);

        let content = note::create_obsidian_note(&note_request);
        let filename = note::suggested_path(&self.config.vault.folder, &captured.title, date);
        info!(
            "Built note '{}' from {} message(s) on {}",
            captured.title, message_count, captured.service
        );

        Ok(Some(ClippedNote {
            content,
            filename,
            title: captured.title,
            service: captured.service,
            message_count,
            skipped: captured.skipped,
        }))
    }

    /// Build the note and save it through the first transport that works
    pub async fn clip_and_save(
        &self,
        request: &ClipRequest,
        transports: &[Box<dyn VaultTransport>],
    ) -> Result<Option<(ClippedNote, SavedNote)>, ClipError> {
        let Some(note) = self.clip(request).await? else {
            return Ok(None);
        };
        let saved = vault::save_with_fallback(transports, &note.content, &note.filename)?;
        Ok(Some((note, saved)))
    }

    /// Transports available from configuration alone
    pub fn configured_transports(&self) -> Vec<Box<dyn VaultTransport>> {
        let mut transports: Vec<Box<dyn VaultTransport>> = Vec::new();
        if let Some(path) = &self.config.vault.path {
            transports.push(Box::new(FilesystemTransport::new(path.clone())));
        }
        transports
    }

    fn capture_phase(&self, request: &ClipRequest) -> Result<Option<Captured>, ClipError> {
        let preferences = request
            .preferences
            .clone()
            .unwrap_or_else(|| self.config.preferences.clone());

        let mut ctx = PageContext::new(request.url.as_str(), &request.html);
        ctx.require_selectors()?;

        if let Some(range) = &request.selection {
            let selection = match range {
                SelectionSpec::Text { start, end } => TextSelection::between_text(&ctx, start, end),
                SelectionSpec::Selector(css) => TextSelection::covering(&ctx, css)?,
            };
            if selection.is_none() {
                debug!("Selection did not resolve against the page");
            }
            ctx.set_selection(selection);
        }

        let mode = request.mode.unwrap_or(preferences.default_mode);
        let count = request.count.unwrap_or(preferences.message_count);
        let result = capture::capture(&ctx, CaptureRequest::from_mode(mode, count, request.target))?;
        if result.is_empty() {
            info!("Nothing to save in {} mode", mode.as_str());
            return Ok(None);
        }

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| note::page_title(&ctx));

        Ok(Some(Captured {
            messages: result.messages,
            skipped: result.skipped,
            title,
            service: ctx.service(),
            preferences,
        }))
    }

    async fn split_oversized(&self, messages: Vec<Message>) -> Result<Vec<Message>, ClipError> {
        let config = self.config.split.chunker_config();
        let chunker = Chunker::new(config);

        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            if chunker.needs_split(&message.content) {
                debug!("Splitting {} char message", message.content.len());
                out.extend(chunker::split_message(message, config).await?);
            } else {
                out.push(message);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CaptureMode;

    const PAGE: &str = r#"<html><head><title>Closures - ChatGPT</title></head><body><main>
        <div data-message-author-role="user" data-message-id="u1"><div class="whitespace-pre-wrap">Explain closures</div></div>
        <div data-message-author-role="assistant" data-message-id="a1"><div class="markdown"><p>A closure captures its environment.</p></div></div>
    </main></body></html>"#;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[tokio::test]
    async fn test_clip_full_thread() {
        let clipper = Clipper::new(Config::default());
        let request = ClipRequest::new("https://chatgpt.com/c/1", PAGE);

        let note = clipper.clip_on(&request, date()).await.unwrap().unwrap();
        assert_eq!(note.title, "Closures");
        assert_eq!(note.filename, "AI Chats/2024-05-01 Closures.md");
        assert_eq!(note.message_count, 2);
        assert!(note.content.starts_with("---\ntitle: Closures\n"));
        assert!(note.content.contains("### User\n\nExplain closures"));
        assert!(note.content.contains("### ChatGPT\n\nA closure captures its environment."));
    }

    #[tokio::test]
    async fn test_empty_selection_is_nothing_to_save() {
        let clipper = Clipper::new(Config::default());
        let mut request = ClipRequest::new("https://chatgpt.com/c/1", PAGE);
        request.mode = Some(CaptureMode::Selection);

        assert!(clipper.clip(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_page_errors() {
        let clipper = Clipper::new(Config::default());
        let request = ClipRequest::new("https://example.com/", PAGE);
        let err = clipper.clip(&request).await.unwrap_err();
        assert_eq!(err.code(), "unsupported_service");
    }

    #[tokio::test]
    async fn test_oversized_message_split_into_parts() {
        let mut config = Config::default();
        config.split.max_chars = 90;
        config.split.overlap_chars = 0;
        let long: String = (0..6).map(|i| format!("<p>Paragraph number {:03}</p>", i)).collect();
        let page = format!(
            r#"<html><body><div data-message-author-role="assistant"><div class="markdown">{}</div></div></body></html>"#,
            long
        );

        let clipper = Clipper::new(config);
        let note = clipper
            .clip_on(&ClipRequest::new("https://chatgpt.com/c/1", page), date())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(note.message_count, 2);
        assert!(note.content.contains("### ChatGPT (part 1/2)"));
        assert!(note.content.contains("### ChatGPT (part 2/2)"));
    }

    #[tokio::test]
    async fn test_clip_and_save_to_vault() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.vault.path = Some(dir.path().to_path_buf());

        let clipper = Clipper::new(config);
        let transports = clipper.configured_transports();
        let (note, saved) = clipper
            .clip_and_save(&ClipRequest::new("https://chatgpt.com/c/1", PAGE), &transports)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(saved.filename, note.filename);
        let written = std::fs::read_to_string(dir.path().join(&note.filename)).unwrap();
        assert_eq!(written, note.content);
    }

    #[test]
    fn test_clip_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let clipper = Clipper::new(Config::default());
        let request = ClipRequest::new("https://chatgpt.com/c/1", PAGE);
        let future = clipper.clip(&request);
        assert_send(&future);
    }
}
