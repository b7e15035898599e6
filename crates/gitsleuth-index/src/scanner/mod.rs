//! Construct boundary detection without a parser.
//!
//! Each scanner walks the lines of a file once, recognizes construct
//! signatures with per-language patterns, and finds where each construct
//! ends: by bracket counting for brace languages, by indentation for Python.
//! Output spans are ordered and never overlap.

mod braces;
mod indent;
mod lexer;

use serde::{Deserialize, Serialize};

use crate::languages::Lang;

pub use braces::BraceSyntax;
pub use indent::IndentSyntax;

/// Kind of construct a chunk covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Class,
    Interface,
    Type,
    Module,
    Import,
    TextSection,
}

impl ChunkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Module => "module",
            Self::Import => "import",
            Self::TextSection => "text_section",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero-based, inclusive line range of one construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: ChunkKind,
}

impl Span {
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Per-language boundary scanner.
#[derive(Debug, Clone, Copy)]
pub enum Scanner {
    Braces(&'static BraceSyntax),
    Indentation(&'static IndentSyntax),
}

impl Scanner {
    /// Scanner for `lang`, or `None` when the language is only window-chunked.
    #[must_use]
    pub fn for_lang(lang: Lang) -> Option<Self> {
        match lang {
            Lang::Python => Some(Self::Indentation(indent::python())),
            other => braces::syntax_for(other).map(Self::Braces),
        }
    }

    /// Find construct spans in `lines`.
    ///
    /// Blocks longer than `max_chunk_lines` are not emitted whole: the scanner
    /// descends into them, and only if nothing inside is recognized is the
    /// block emitted as consecutive pieces of at most `max_chunk_lines` lines.
    #[must_use]
    pub fn detect_boundaries(&self, lines: &[&str], max_chunk_lines: usize) -> Vec<Span> {
        let max_chunk_lines = max_chunk_lines.max(1);
        match self {
            Self::Braces(syntax) => braces::scan(syntax, lines, max_chunk_lines),
            Self::Indentation(syntax) => indent::scan(syntax, lines, max_chunk_lines),
        }
    }
}

struct Pending {
    span: Span,
    spans_before: usize,
}

/// Accumulates spans in line order and tracks oversized blocks being descended into.
struct SpanCollector {
    spans: Vec<Span>,
    pending: Vec<Pending>,
    last_end: Option<usize>,
    max_lines: usize,
}

impl SpanCollector {
    fn new(max_lines: usize) -> Self {
        Self {
            spans: Vec::new(),
            pending: Vec::new(),
            last_end: None,
            max_lines,
        }
    }

    /// First line not yet covered by an emitted span.
    fn next_free(&self) -> usize {
        self.last_end.map_or(0, |end| end + 1)
    }

    fn push(&mut self, span: Span) {
        self.last_end = Some(span.end);
        self.spans.push(span);
    }

    /// Emit `span` if it fits, otherwise remember it and scan its inside.
    /// Returns the line to continue scanning from.
    fn offer(&mut self, span: Span, signature_line: usize) -> usize {
        if span.line_count() > self.max_lines {
            self.pending.push(Pending {
                span,
                spans_before: self.spans.len(),
            });
            signature_line + 1
        } else {
            self.push(span);
            span.end + 1
        }
    }

    /// Close every descended block that ends before `line`.
    fn settle(&mut self, line: usize) {
        while self.pending.last().is_some_and(|p| p.span.end < line) {
            let Some(done) = self.pending.pop() else {
                break;
            };
            if self.spans.len() == done.spans_before {
                self.push_windows(done.span);
            }
        }
    }

    fn push_windows(&mut self, span: Span) {
        let mut start = span.start.max(self.next_free());
        while start <= span.end {
            let end = (start + self.max_lines - 1).min(span.end);
            self.push(Span {
                start,
                end,
                kind: span.kind,
            });
            start = end + 1;
        }
    }

    fn finish(mut self) -> Vec<Span> {
        self.settle(usize::MAX);
        self.spans
    }
}

fn next_nonblank(lines: &[&str], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&i| !lines[i].trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Span {
        Span {
            start,
            end,
            kind: ChunkKind::Function,
        }
    }

    #[test]
    fn collector_emits_small_spans_in_order() {
        let mut c = SpanCollector::new(10);
        assert_eq!(c.offer(span(0, 3), 0), 4);
        assert_eq!(c.offer(span(5, 6), 5), 7);
        assert_eq!(c.finish(), vec![span(0, 3), span(5, 6)]);
    }

    #[test]
    fn oversized_block_with_inner_spans_is_dropped() {
        let mut c = SpanCollector::new(5);
        assert_eq!(c.offer(span(0, 20), 0), 1);
        c.settle(2);
        c.offer(span(2, 4), 2);
        c.settle(21);
        assert_eq!(c.finish(), vec![span(2, 4)]);
    }

    #[test]
    fn oversized_block_without_inner_spans_is_windowed() {
        let mut c = SpanCollector::new(5);
        c.offer(span(0, 11), 0);
        let spans = c.finish();
        assert_eq!(spans, vec![span(0, 4), span(5, 9), span(10, 11)]);
    }

    #[test]
    fn scanner_availability() {
        assert!(Scanner::for_lang(Lang::Rust).is_some());
        assert!(matches!(
            Scanner::for_lang(Lang::Python),
            Some(Scanner::Indentation(_))
        ));
        assert!(Scanner::for_lang(Lang::Markdown).is_none());
        assert!(Scanner::for_lang(Lang::Ruby).is_none());
    }

    #[test]
    fn chunk_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ChunkKind::TextSection).unwrap(),
            "\"text_section\""
        );
        assert_eq!(ChunkKind::Interface.to_string(), "interface");
    }
}
