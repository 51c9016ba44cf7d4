//! Message splitter - breaks oversized message HTML into bounded parts
//!
//! Splits at top-level node boundaries so no element is cut in half. The
//! tail of each part is repeated at the head of the next (bounded by the
//! overlap window) for reading continuity.

use scraper::{ElementRef, Html, Node};
use tracing::debug;

use crate::dom;
use crate::types::{ClipError, Message};

/// Split configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum characters of HTML per part
    pub max_chars: usize,
    /// Characters of trailing nodes repeated at the start of the next part
    pub overlap_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 50_000,
            overlap_chars: 500,
        }
    }
}

/// One part of a split message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub html: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub char_count: usize,
}

/// Chunker splits message HTML into parts of bounded size
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkerConfig::default())
    }

    /// Whether `html` exceeds one part
    pub fn needs_split(&self, html: &str) -> bool {
        html.chars().count() > self.config.max_chars
    }

    /// Split `html` into parts. Content that fits is returned whole.
    pub fn chunk(&self, html: &str) -> Vec<Chunk> {
        if html.trim().is_empty() {
            return vec![];
        }

        if !self.needs_split(html) {
            return vec![Chunk {
                html: html.to_string(),
                chunk_index: 0,
                total_chunks: 1,
                char_count: html.chars().count(),
            }];
        }

        let units = top_level_units(html);
        let mut chunks = Vec::new();
        let mut current: Vec<(String, usize)> = Vec::new();
        let mut current_chars = 0;
        // Units at the head of `current` that repeat the previous part
        let mut carried = 0;

        for unit in units {
            let unit_chars = unit.chars().count();

            // A part must hold something new, so an overlap-only part never flushes
            if current_chars + unit_chars > self.config.max_chars && current.len() > carried {
                push_chunk(&mut chunks, &current, current_chars);

                // Keep trailing units within the overlap window
                let mut overlap_chars = 0;
                let mut keep = 0;
                for (_, chars) in current.iter().rev() {
                    if overlap_chars + chars > self.config.overlap_chars {
                        break;
                    }
                    overlap_chars += chars;
                    keep += 1;
                }
                // Never let the overlap alone fill the next part
                if overlap_chars + unit_chars > self.config.max_chars {
                    keep = 0;
                    overlap_chars = 0;
                }
                current = current.split_off(current.len() - keep);
                current_chars = overlap_chars;
                carried = keep;
            }

            current.push((unit, unit_chars));
            current_chars += unit_chars;
        }

        if current.len() > carried || chunks.is_empty() {
            push_chunk(&mut chunks, &current, current_chars);
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }

        debug!("Split {} chars into {} parts", html.len(), total);
        chunks
    }

    /// Split one message into part messages. A message that fits is
    /// returned unchanged.
    pub fn split(&self, message: &Message) -> Vec<Message> {
        let chunks = self.chunk(&message.content);
        if chunks.len() <= 1 {
            return vec![message.clone()];
        }

        chunks
            .into_iter()
            .map(|chunk| Message {
                role: message.role,
                content: chunk.html,
                timestamp: message.timestamp.clone(),
                part: Some(chunk.chunk_index + 1),
                total_parts: Some(chunk.total_chunks),
            })
            .collect()
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, units: &[(String, usize)], char_count: usize) {
    let html: String = units.iter().map(|(unit, _)| unit.as_str()).collect();
    chunks.push(Chunk {
        html,
        chunk_index: chunks.len(),
        total_chunks: 0,
        char_count,
    });
}

/// Serialized top-level nodes of a fragment. Whitespace-only text between
/// elements is folded into the following unit.
fn top_level_units(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();

    let mut units = Vec::new();
    let mut pending = String::new();
    for child in root.children() {
        let mut unit = std::mem::take(&mut pending);
        match child.value() {
            Node::Text(text) => {
                unit.push_str(&dom::escape_text(&text.text));
                if text.text.trim().is_empty() {
                    pending = unit;
                    continue;
                }
            }
            Node::Comment(comment) => {
                unit.push_str("<!--");
                unit.push_str(&comment.comment);
                unit.push_str("-->");
            }
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    dom::write_element(element, &mut unit, &|_: &ElementRef<'_>| None);
                }
            }
            _ => {}
        }
        units.push(unit);
    }
    if !pending.is_empty() {
        match units.last_mut() {
            Some(last) => last.push_str(&pending),
            None => units.push(pending),
        }
    }
    units
}

/// Split `message` off the calling thread.
///
/// The split is CPU-bound, so it runs on the blocking pool; dropping the
/// returned future abandons the result.
pub async fn split_message(message: Message, config: ChunkerConfig) -> Result<Vec<Message>, ClipError> {
    tokio::task::spawn_blocking(move || Chunker::new(config).split(&message))
        .await
        .map_err(|e| ClipError::Worker(e.to_string()))
}
