//! Indentation-delimited scanning for Python.

use std::sync::LazyLock;

use regex::Regex;

use super::{ChunkKind, Span, SpanCollector, next_nonblank};

/// Longest def/class header (parameters spread over lines) followed.
const HEADER_LINES: usize = 32;

/// Recognizers for an indentation-delimited language.
#[derive(Debug)]
pub struct IndentSyntax {
    function: Regex,
    class: Regex,
    decorator: Regex,
    import: Regex,
}

static PYTHON: LazyLock<IndentSyntax> = LazyLock::new(|| IndentSyntax {
    function: Regex::new(r"^\s*(?:async\s+)?def\s+\w+").unwrap(),
    class: Regex::new(r"^\s*class\s+\w+").unwrap(),
    decorator: Regex::new(r"^\s*@[\w.]+").unwrap(),
    import: Regex::new(r"^\s*(?:import\s+\w|from\s+[\w.]+\s+import\b)").unwrap(),
});

pub(super) fn python() -> &'static IndentSyntax {
    &PYTHON
}

impl IndentSyntax {
    fn construct(&self, line: &str) -> Option<ChunkKind> {
        if self.function.is_match(line) {
            Some(ChunkKind::Function)
        } else if self.class.is_match(line) {
            Some(ChunkKind::Class)
        } else {
            None
        }
    }
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// For each line, whether it begins inside a triple-quoted string.
fn in_triple_quote(lines: &[&str]) -> Vec<bool> {
    let mut open: Option<&str> = None;
    lines
        .iter()
        .map(|line| {
            let starts_inside = open.is_some();
            let mut rest = *line;
            loop {
                match open {
                    Some(delim) => match rest.find(delim) {
                        Some(pos) => {
                            rest = &rest[pos + 3..];
                            open = None;
                        }
                        None => break,
                    },
                    None => {
                        let next = [r#"""""#, "'''"]
                            .into_iter()
                            .filter_map(|d| rest.find(d).map(|pos| (pos, d)))
                            .min_by_key(|(pos, _)| *pos);
                        match next {
                            Some((pos, delim)) => {
                                rest = &rest[pos + 3..];
                                open = Some(delim);
                            }
                            None => break,
                        }
                    }
                }
            }
            starts_inside
        })
        .collect()
}

/// Net bracket depth change of a line, ignoring quoted text and comments.
fn bracket_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '#' => break,
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => delta += 1,
            ')' | ']' | '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Last line of a statement whose brackets may span several lines.
fn statement_end(lines: &[&str], start: usize, limit: usize) -> usize {
    let mut depth = 0;
    for (offset, line) in lines[start..].iter().enumerate().take(limit) {
        depth += bracket_delta(line);
        if depth <= 0 {
            return start + offset;
        }
    }
    start
}

pub(super) fn scan(syntax: &IndentSyntax, lines: &[&str], max_lines: usize) -> Vec<Span> {
    let in_string = in_triple_quote(lines);
    let mut out = SpanCollector::new(max_lines);
    let mut i = 0;

    while i < lines.len() {
        out.settle(i);
        let line = lines[i];
        if in_string[i] || line.trim().is_empty() {
            i += 1;
            continue;
        }

        if syntax.import.is_match(line) {
            let mut end = statement_end(lines, i, HEADER_LINES);
            loop {
                match next_nonblank(lines, end + 1) {
                    Some(next) if !in_string[next] && syntax.import.is_match(lines[next]) => {
                        end = statement_end(lines, next, HEADER_LINES);
                    }
                    _ => break,
                }
            }
            out.push(Span {
                start: i,
                end,
                kind: ChunkKind::Import,
            });
            i = end + 1;
            continue;
        }

        if !syntax.decorator.is_match(line) && syntax.construct(line).is_none() {
            i += 1;
            continue;
        }

        // Decorators belong to the def/class that follows them.
        let start = i;
        let mut header = i;
        while header < lines.len() && syntax.decorator.is_match(lines[header]) {
            header = statement_end(lines, header, HEADER_LINES) + 1;
        }
        let Some(kind) = lines.get(header).and_then(|l| syntax.construct(l)) else {
            i = header.max(i + 1);
            continue;
        };

        let indent = indent_of(lines[header]);
        let header_end = statement_end(lines, header, HEADER_LINES);
        let mut end = header_end;
        let mut k = header_end + 1;
        while k < lines.len() {
            if in_string[k] {
                end = k;
            } else if !lines[k].trim().is_empty() {
                if indent_of(lines[k]) <= indent {
                    break;
                }
                end = k;
            }
            k += 1;
        }

        i = out.offer(Span { start, end, kind }, header);
    }

    out.finish()
}
