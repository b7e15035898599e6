//! Splits source files into retrieval chunks: construct spans where a scanner
//! recognizes them, contiguous line windows otherwise.

use serde::{Deserialize, Serialize};

use crate::languages::Lang;
use crate::scanner::{ChunkKind, Scanner, Span};

/// One retrieval unit cut from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub file_path: String,
    /// One-based, inclusive.
    pub start_line: usize,
    /// One-based, inclusive.
    pub end_line: usize,
    #[serde(rename = "chunk_type")]
    pub kind: ChunkKind,
    pub language: Lang,
    pub is_semantic: bool,
    /// Dense, zero-based position within the file.
    pub chunk_id: usize,
    /// Content length in characters.
    pub chunk_size: usize,
}

/// Chunker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Semantic spans with fewer trimmed characters are discarded (default: 50).
    pub min_chunk_chars: usize,
    /// Line count of a fallback window (default: 100).
    pub fallback_window_lines: usize,
    /// Longest construct emitted whole (default: 150).
    pub max_chunk_lines: usize,
    /// Files with fewer trimmed characters produce no chunks (default: 10).
    pub min_content_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: 50,
            fallback_window_lines: 100,
            max_chunk_lines: 150,
            min_content_chars: 10,
        }
    }
}

/// Why a file fell back to line windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Degraded {
    NoScanner,
    NoConstructs,
    AllBelowMinimum,
}

/// Chunk one file. Never fails; unrecognized content is windowed.
///
/// `extension` may be given with or without the leading dot. Files whose
/// extension has no known language are tagged [`Lang::Text`].
#[must_use]
pub fn chunk_document(
    content: &str,
    file_path: &str,
    extension: &str,
    config: &ChunkerConfig,
) -> Vec<Chunk> {
    if content.trim().chars().count() < config.min_content_chars {
        return Vec::new();
    }

    let lang = Lang::from_extension(extension).unwrap_or(Lang::Text);
    let lines: Vec<&str> = content.lines().collect();

    let semantic = match Scanner::for_lang(lang) {
        None => Err(Degraded::NoScanner),
        Some(scanner) => {
            let spans = scanner.detect_boundaries(&lines, config.max_chunk_lines);
            if spans.is_empty() {
                Err(Degraded::NoConstructs)
            } else {
                let kept: Vec<Span> = spans
                    .into_iter()
                    .filter(|s| span_text(&lines, s).trim().chars().count() >= config.min_chunk_chars)
                    .collect();
                if kept.is_empty() {
                    Err(Degraded::AllBelowMinimum)
                } else {
                    Ok(kept)
                }
            }
        }
    };

    let chunks: Vec<Chunk> = match semantic {
        Ok(spans) => spans
            .iter()
            .enumerate()
            .map(|(chunk_id, span)| {
                build_chunk(span_text(&lines, span), file_path, lang, span, true, chunk_id)
            })
            .collect(),
        Err(reason) => {
            tracing::debug!(file = %file_path, ?reason, "chunking degraded to line windows");
            fallback_spans(lines.len(), config.fallback_window_lines)
                .iter()
                .enumerate()
                .map(|(chunk_id, span)| {
                    build_chunk(span_text(&lines, span), file_path, lang, span, false, chunk_id)
                })
                .collect()
        }
    };

    tracing::debug!(file = %file_path, chunks = chunks.len(), language = %lang, "file chunked");
    chunks
}

/// Contiguous windows partitioning `0..line_count`, each at most `window` lines.
fn fallback_spans(line_count: usize, window: usize) -> Vec<Span> {
    let window = window.clamp(1, line_count.max(1));
    (0..line_count)
        .step_by(window)
        .map(|start| Span {
            start,
            end: (start + window).min(line_count) - 1,
            kind: ChunkKind::TextSection,
        })
        .collect()
}

fn span_text(lines: &[&str], span: &Span) -> String {
    lines[span.start..=span.end].join("\n")
}

fn build_chunk(
    content: String,
    file_path: &str,
    lang: Lang,
    span: &Span,
    is_semantic: bool,
    chunk_id: usize,
) -> Chunk {
    Chunk {
        chunk_size: content.chars().count(),
        content,
        file_path: file_path.to_string(),
        start_line: span.start + 1,
        end_line: span.end + 1,
        kind: span.kind,
        language: lang,
        is_semantic,
        chunk_id,
    }
}
