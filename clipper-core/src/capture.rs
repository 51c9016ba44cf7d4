//! Capture strategies.
//!
//! Each strategy is a state-free function over a [`PageContext`] producing
//! an ordered [`CaptureResult`]. A message element that yields nothing is
//! counted as skipped and the capture continues.

use scraper::ElementRef;
use tracing::{debug, info};

use crate::extractor;
use crate::page::PageContext;
use crate::types::{CaptureMode, CaptureResult, ClipError, Role};

/// What a save action asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRequest {
    /// One message by its position among the page's message elements.
    /// `None` targets the last message.
    Single(Option<usize>),
    Selection,
    LastN(usize),
    Full,
}

impl CaptureRequest {
    /// Build a request from a mode plus the optional count/target parameters
    pub fn from_mode(mode: CaptureMode, count: usize, target: Option<usize>) -> Self {
        match mode {
            CaptureMode::Single => CaptureRequest::Single(target),
            CaptureMode::Selection => CaptureRequest::Selection,
            CaptureMode::LastN => CaptureRequest::LastN(count),
            CaptureMode::Full => CaptureRequest::Full,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        match self {
            CaptureRequest::Single(_) => CaptureMode::Single,
            CaptureRequest::Selection => CaptureMode::Selection,
            CaptureRequest::LastN(_) => CaptureMode::LastN,
            CaptureRequest::Full => CaptureMode::Full,
        }
    }
}

/// Run the strategy named by `request`
pub fn capture(ctx: &PageContext, request: CaptureRequest) -> Result<CaptureResult, ClipError> {
    ctx.require_selectors()?;

    let result = match request {
        CaptureRequest::Single(target) => {
            let elements = ctx.message_elements();
            let available = elements.len();
            let element = match target {
                Some(index) => elements
                    .get(index)
                    .copied()
                    .ok_or(ClipError::TargetOutOfRange { index, available })?,
                None => match elements.last() {
                    Some(element) => *element,
                    None => return Ok(CaptureResult::empty()),
                },
            };
            capture_single(ctx, element)
        }
        CaptureRequest::Selection => capture_selection(ctx),
        CaptureRequest::LastN(count) => capture_last_n(ctx, count),
        CaptureRequest::Full => capture_full(ctx),
    };

    info!(
        "Captured {} message(s) in {} mode ({} skipped)",
        result.len(),
        request.mode().as_str(),
        result.skipped
    );
    Ok(result)
}

/// Exactly the one element that triggered the action
pub fn capture_single(ctx: &PageContext, element: ElementRef<'_>) -> CaptureResult {
    extract_all(ctx, std::iter::once(element))
}

/// Messages intersecting the active selection.
///
/// No selection yields an empty result. When the selection touches no
/// message container, the selected range itself becomes one message.
pub fn capture_selection(ctx: &PageContext) -> CaptureResult {
    let Some(selection) = ctx.selection() else {
        debug!("No selection, nothing to capture");
        return CaptureResult::empty();
    };

    let intersecting: Vec<ElementRef<'_>> = ctx
        .message_elements()
        .into_iter()
        .filter(|element| selection.intersects(ctx, element))
        .collect();

    if !intersecting.is_empty() {
        return extract_all(ctx, intersecting);
    }

    let Some(set) = ctx.selectors() else {
        return CaptureResult::empty();
    };
    match extractor::extract_html(&selection.clone_contents(ctx), Role::Assistant, set) {
        Ok(message) => CaptureResult {
            messages: vec![message],
            skipped: 0,
        },
        Err(e) => {
            debug!("Selected range has nothing to save: {}", e);
            CaptureResult::empty()
        }
    }
}

/// The final `count` messages (at least one). Fewer available means all.
pub fn capture_last_n(ctx: &PageContext, count: usize) -> CaptureResult {
    let elements = ctx.message_elements();
    let count = count.max(1);
    let start = elements.len().saturating_sub(count);
    extract_all(ctx, elements.into_iter().skip(start))
}

/// Every message in document order
pub fn capture_full(ctx: &PageContext) -> CaptureResult {
    extract_all(ctx, ctx.message_elements())
}

fn extract_all<'a>(
    ctx: &PageContext,
    elements: impl IntoIterator<Item = ElementRef<'a>>,
) -> CaptureResult {
    let mut result = CaptureResult::empty();
    let Some(set) = ctx.selectors() else {
        return result;
    };

    for element in elements {
        match extractor::extract_single(element, set) {
            Some(message) => result.messages.push(message),
            None => result.skipped += 1,
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::TextSelection;

    fn thread(turns: usize) -> String {
        let mut body = String::new();
        for i in 0..turns {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            body.push_str(&format!(
                r#"<div data-message-author-role="{role}" data-message-id="m{i}"><div class="markdown"><p>Message {i}</p></div></div>"#
            ));
        }
        format!("<html><head><title>Thread - ChatGPT</title></head><body><main>{body}</main></body></html>")
    }

    fn texts(result: &CaptureResult) -> Vec<String> {
        result.messages.iter().map(|m| m.content.clone()).collect()
    }

    #[test]
    fn test_full_capture_in_document_order() {
        let ctx = PageContext::new("https://chatgpt.com/c/1", &thread(4));
        let result = capture(&ctx, CaptureRequest::Full).unwrap();

        assert_eq!(result.len(), 4);
        assert_eq!(result.messages[0].role, Role::User);
        assert_eq!(result.messages[1].role, Role::Assistant);
        assert_eq!(result.messages[3].content, "<p>Message 3</p>");
    }

    #[test]
    fn test_last_n_takes_tail() {
        let ctx = PageContext::new("https://chatgpt.com/c/1", &thread(5));
        let result = capture(&ctx, CaptureRequest::LastN(2)).unwrap();
        assert_eq!(texts(&result), vec!["<p>Message 3</p>", "<p>Message 4</p>"]);
    }

    #[test]
    fn test_last_n_larger_than_thread_returns_all() {
        let ctx = PageContext::new("https://chatgpt.com/c/1", &thread(3));
        let result = capture(&ctx, CaptureRequest::LastN(30)).unwrap();
        assert_eq!(
            texts(&result),
            vec!["<p>Message 0</p>", "<p>Message 1</p>", "<p>Message 2</p>"]
        );
    }

    #[test]
    fn test_last_n_zero_means_one() {
        let ctx = PageContext::new("https://chatgpt.com/c/1", &thread(3));
        let result = capture(&ctx, CaptureRequest::LastN(0)).unwrap();
        assert_eq!(texts(&result), vec!["<p>Message 2</p>"]);
    }

    #[test]
    fn test_single_by_index_and_default_last() {
        let ctx = PageContext::new("https://chatgpt.com/c/1", &thread(3));

        let result = capture(&ctx, CaptureRequest::Single(Some(1))).unwrap();
        assert_eq!(texts(&result), vec!["<p>Message 1</p>"]);

        let result = capture(&ctx, CaptureRequest::Single(None)).unwrap();
        assert_eq!(texts(&result), vec!["<p>Message 2</p>"]);
    }

    #[test]
    fn test_single_out_of_range() {
        let ctx = PageContext::new("https://chatgpt.com/c/1", &thread(2));
        let err = capture(&ctx, CaptureRequest::Single(Some(7))).unwrap_err();
        assert!(matches!(
            err,
            ClipError::TargetOutOfRange { index: 7, available: 2 }
        ));
    }

    #[test]
    fn test_selection_without_range_is_empty() {
        let ctx = PageContext::new("https://chatgpt.com/c/1", &thread(3));
        let result = capture(&ctx, CaptureRequest::Selection).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_selection_collects_intersecting_messages() {
        let mut ctx = PageContext::new("https://chatgpt.com/c/1", &thread(4));
        let selection = TextSelection::between_text(&ctx, "Message 1", "Message 2");
        ctx.set_selection(selection);

        let result = capture(&ctx, CaptureRequest::Selection).unwrap();
        assert_eq!(texts(&result), vec!["<p>Message 1</p>", "<p>Message 2</p>"]);
    }

    #[test]
    fn test_selection_outside_messages_uses_range_contents() {
        let page = r#"<html><body><aside><p>Side note</p></aside>
            <div data-message-author-role="user"><div class="whitespace-pre-wrap">Hi</div></div></body></html>"#;
        let mut ctx = PageContext::new("https://chatgpt.com/c/1", page);
        let selection = TextSelection::covering(&ctx, "aside p").unwrap();
        ctx.set_selection(selection);

        let result = capture(&ctx, CaptureRequest::Selection).unwrap();
        assert_eq!(texts(&result), vec!["<p>Side note</p>"]);
    }

    #[test]
    fn test_selection_outside_messages_gets_math_and_code_cleanup() {
        let page = r#"<html><body><aside>
            <p>Area <span class="katex"><annotation encoding="application/x-tex">\pi r^2</annotation><span class="katex-html">πr2</span></span></p>
            <pre><code class="language-rust">let r = 2;</code></pre>
        </aside>
            <div data-message-author-role="user"><div class="whitespace-pre-wrap">Hi</div></div></body></html>"#;
        let mut ctx = PageContext::new("https://chatgpt.com/c/1", page);
        let selection = TextSelection::covering(&ctx, "aside p, aside pre").unwrap();
        ctx.set_selection(selection);

        let result = capture(&ctx, CaptureRequest::Selection).unwrap();
        assert_eq!(result.len(), 1);
        let content = &result.messages[0].content;
        assert!(content.contains(r#"<span data-clipper-math="inline">$\pi r^2$</span>"#));
        assert!(!content.contains("πr2"));
        assert!(content.contains(r#"<pre data-clipper-lang="rust">"#));
    }

    #[test]
    fn test_empty_elements_are_skipped_not_fatal() {
        let page = r#"<html><body>
            <div data-message-author-role="user"><div class="whitespace-pre-wrap">Question</div></div>
            <div data-message-author-role="assistant"><button class="ai-clipper-save-btn">Save</button></div>
            <div data-message-author-role="assistant"><div class="markdown"><p>Answer</p></div></div>
        </body></html>"#;
        let ctx = PageContext::new("https://chatgpt.com/c/1", page);
        let result = capture(&ctx, CaptureRequest::Full).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_unsupported_page_is_rejected() {
        let ctx = PageContext::new("https://example.com/", &thread(2));
        assert!(matches!(
            capture(&ctx, CaptureRequest::Full),
            Err(ClipError::UnsupportedService(_))
        ));
    }

    #[test]
    fn test_request_from_mode() {
        assert_eq!(
            CaptureRequest::from_mode(CaptureMode::LastN, 30, None),
            CaptureRequest::LastN(30)
        );
        assert_eq!(
            CaptureRequest::from_mode(CaptureMode::Single, 30, Some(2)),
            CaptureRequest::Single(Some(2))
        );
    }
}
