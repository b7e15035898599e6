//! Signature patterns and block-end detection for brace-delimited languages.

use std::ops::ControlFlow;
use std::sync::LazyLock;

use regex::Regex;

use super::lexer::{Lexer, Lexical, code_line_starts};
use super::{ChunkKind, Span, SpanCollector, next_nonblank};
use crate::languages::Lang;

/// Lines searched for an opening `{` before a signature is treated as brace-less.
const HEADER_LINES: usize = 12;
/// Longest multi-line import statement followed.
const IMPORT_LINES: usize = 64;

static STATEMENT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:return|else|case|throw|new|delete|goto|await|yield)\b").unwrap()
});

/// Recognizers for one brace-delimited language.
#[derive(Debug)]
pub struct BraceSyntax {
    lexical: Lexical,
    signatures: Vec<(ChunkKind, Regex)>,
    import: Regex,
    attribute: Option<Regex>,
    reject_names: &'static [&'static str],
}

impl BraceSyntax {
    fn new(
        lexical: Lexical,
        signatures: &[(ChunkKind, &str)],
        import: &str,
        attribute: Option<&str>,
        reject_names: &'static [&'static str],
    ) -> Self {
        Self {
            lexical,
            signatures: signatures
                .iter()
                .map(|(kind, pattern)| (*kind, Regex::new(pattern).unwrap()))
                .collect(),
            import: Regex::new(import).unwrap(),
            attribute: attribute.map(|p| Regex::new(p).unwrap()),
            reject_names,
        }
    }

    fn signature(&self, line: &str) -> Option<ChunkKind> {
        if STATEMENT_PREFIX.is_match(line) {
            return None;
        }
        self.signatures.iter().find_map(|(kind, re)| {
            let caps = re.captures(line)?;
            let rejected = caps
                .name("name")
                .is_some_and(|n| self.reject_names.contains(&n.as_str()));
            (!rejected).then_some(*kind)
        })
    }

    fn starts_construct(&self, line: &str) -> bool {
        self.import.is_match(line) || self.signature(line).is_some()
    }

    /// Extend a span upwards over attribute, annotation or doc lines, never below `floor`.
    fn leading_attributes(&self, lines: &[&str], in_code: &[bool], at: usize, floor: usize) -> usize {
        let Some(attribute) = &self.attribute else {
            return at;
        };
        let mut start = at;
        while start > floor && in_code[start - 1] && attribute.is_match(lines[start - 1]) {
            start -= 1;
        }
        start
    }

    /// Line on which the construct starting at `start` ends.
    ///
    /// Counts `{`/`(` against `}`/`)` outside literals and comments and stops
    /// once the count returns to zero after the first `{`. A `;` at depth zero
    /// before any `{` ends a declaration. A header with no `{` ends before a
    /// blank line or the next construct. `None` means the block never closes.
    pub(crate) fn block_end(&self, lines: &[&str], start: usize) -> Option<usize> {
        let mut lexer = Lexer::new(&self.lexical);
        let mut depth: i32 = 0;
        let mut opened = false;

        for (offset, line) in lines[start..].iter().enumerate() {
            let idx = start + offset;
            if offset > 0
                && !opened
                && depth <= 0
                && (line.trim().is_empty() || offset > HEADER_LINES || self.starts_construct(line))
            {
                return Some(idx - 1);
            }

            let flow = lexer.scan_line(line, |c| {
                match c {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '(' => depth += 1,
                    '}' | ')' => {
                        depth -= 1;
                        if opened && depth <= 0 {
                            return ControlFlow::Break(());
                        }
                    }
                    ';' if !opened && depth <= 0 => return ControlFlow::Break(()),
                    _ => {}
                }
                ControlFlow::Continue(())
            });
            if flow.is_break() {
                return Some(idx);
            }
        }

        if opened || depth > 0 {
            None
        } else {
            Some(lines.len() - 1)
        }
    }

    /// Last line of a possibly multi-line statement such as `import { a, b } from "x"`.
    fn statement_end(&self, lines: &[&str], start: usize) -> usize {
        let mut lexer = Lexer::new(&self.lexical);
        let mut depth: i32 = 0;
        for (offset, line) in lines[start..].iter().enumerate().take(IMPORT_LINES) {
            let _ = lexer.scan_line(line, |c| {
                match c {
                    '{' | '(' => depth += 1,
                    '}' | ')' => depth -= 1,
                    _ => {}
                }
                ControlFlow::Continue(())
            });
            if depth <= 0 {
                return start + offset;
            }
        }
        start
    }

    /// Consecutive import lines, blank lines between them included.
    fn import_run_end(&self, lines: &[&str], in_code: &[bool], start: usize) -> usize {
        let mut end = self.statement_end(lines, start);
        loop {
            match next_nonblank(lines, end + 1) {
                Some(next) if in_code[next] && self.import.is_match(lines[next]) => {
                    end = self.statement_end(lines, next);
                }
                _ => return end,
            }
        }
    }
}

pub(super) fn scan(syntax: &BraceSyntax, lines: &[&str], max_lines: usize) -> Vec<Span> {
    let in_code = code_line_starts(lines, &syntax.lexical);
    let mut out = SpanCollector::new(max_lines);
    let mut i = 0;

    while i < lines.len() {
        out.settle(i);
        let line = lines[i];
        if !in_code[i] || line.trim().is_empty() {
            i += 1;
            continue;
        }

        if syntax.import.is_match(line) {
            let end = syntax.import_run_end(lines, &in_code, i);
            out.push(Span {
                start: i,
                end,
                kind: ChunkKind::Import,
            });
            i = end + 1;
            continue;
        }

        if let Some(kind) = syntax.signature(line) {
            let start = syntax.leading_attributes(lines, &in_code, i, out.next_free());
            let end = syntax
                .block_end(lines, i)
                .unwrap_or(lines.len() - 1);
            i = out.offer(Span { start, end, kind }, i);
            continue;
        }

        i += 1;
    }

    out.finish()
}

const C_FAMILY: Lexical = Lexical {
    line_comment: Some("//"),
    block_comments: true,
    quotes: &['"', '\''],
    multiline_quotes: &[],
    raw_quotes: &[],
    lifetimes: false,
};

const JS_LEXICAL: Lexical = Lexical {
    line_comment: Some("//"),
    block_comments: true,
    quotes: &['"', '\'', '`'],
    multiline_quotes: &['`'],
    raw_quotes: &[],
    lifetimes: false,
};

const CONTROL_WORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "else", "do", "try", "with", "function",
    "synchronized", "sizeof", "defined", "alignof", "decltype", "foreach", "using", "lock",
];

static RUST: LazyLock<BraceSyntax> = LazyLock::new(|| {
    BraceSyntax::new(
        Lexical {
            line_comment: Some("//"),
            block_comments: true,
            quotes: &['"', '\''],
            multiline_quotes: &['"'],
            raw_quotes: &[],
            lifetimes: true,
        },
        &[
            (
                ChunkKind::Function,
                r#"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+\w+"#,
            ),
            (ChunkKind::Function, r"^\s*macro_rules!\s*\w+"),
            (
                ChunkKind::Interface,
                r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:unsafe\s+)?(?:auto\s+)?trait\s+\w+",
            ),
            (
                ChunkKind::Class,
                r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:struct|enum|union)\s+\w+",
            ),
            (ChunkKind::Class, r"^\s*(?:unsafe\s+)?impl\b"),
            (ChunkKind::Type, r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?type\s+\w+"),
            (ChunkKind::Module, r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?mod\s+\w+"),
        ],
        r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:use\s|extern\s+crate\s)",
        Some(r"^\s*(?:#\[|///)"),
        CONTROL_WORDS,
    )
});

const JS_FUNCTION: &str = r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\b";
const JS_ARROW: &str = r"^\s*(?:export\s+)?(?:const|let|var)\s+[\w$]+\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|(?:\([^)]*\)|[\w$]+)\s*(?::[^=]+)?=>)";
const JS_CLASS: &str = r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\b";
const JS_METHOD: &str = r"^\s+(?:(?:public|private|protected|static|readonly|override|abstract|async|get|set)\s+)*\*?(?P<name>[A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\(.*\)\s*(?::[^{]*)?\{\s*$";
const JS_IMPORT: &str = r"^\s*(?:import\b[^(]|export\s+(?:\*|\{[^}]*\})\s+from\b|(?:const|let|var)\s+[\w${}\s,:]+=\s*require\()";

static JAVASCRIPT: LazyLock<BraceSyntax> = LazyLock::new(|| {
    BraceSyntax::new(
        JS_LEXICAL,
        &[
            (ChunkKind::Function, JS_FUNCTION),
            (ChunkKind::Function, JS_ARROW),
            (ChunkKind::Class, JS_CLASS),
            (ChunkKind::Function, JS_METHOD),
        ],
        JS_IMPORT,
        Some(r"^\s*@[\w$]+"),
        CONTROL_WORDS,
    )
});

static TYPESCRIPT: LazyLock<BraceSyntax> = LazyLock::new(|| {
    BraceSyntax::new(
        JS_LEXICAL,
        &[
            (ChunkKind::Function, JS_FUNCTION),
            (ChunkKind::Function, JS_ARROW),
            (ChunkKind::Class, JS_CLASS),
            (
                ChunkKind::Interface,
                r"^\s*(?:export\s+)?(?:declare\s+)?interface\s+\w+",
            ),
            (
                ChunkKind::Type,
                r"^\s*(?:export\s+)?(?:declare\s+)?type\s+\w+",
            ),
            (
                ChunkKind::Class,
                r"^\s*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+\w+",
            ),
            (
                ChunkKind::Module,
                r"^\s*(?:export\s+)?(?:declare\s+)?(?:namespace|module)\s+[\w.]+",
            ),
            (ChunkKind::Function, JS_METHOD),
        ],
        JS_IMPORT,
        Some(r"^\s*@[\w$]+"),
        CONTROL_WORDS,
    )
});

static JAVA: LazyLock<BraceSyntax> = LazyLock::new(|| {
    BraceSyntax::new(
        C_FAMILY,
        &[
            (
                ChunkKind::Interface,
                r"^\s*(?:(?:public|protected|private|static|abstract|sealed|non-sealed|strictfp)\s+)*@?interface\s+\w+",
            ),
            (
                ChunkKind::Class,
                r"^\s*(?:(?:public|protected|private|static|abstract|final|sealed|non-sealed|strictfp)\s+)*(?:class|record|enum)\s+\w+",
            ),
            (
                ChunkKind::Function,
                r"^\s*(?:(?:public|protected|private|static|abstract|final|synchronized|native|default)\s+)+(?:<[^>]+>\s+)?(?:[\w<>\[\]?,.]+\s+)*?(?P<name>\w+)\s*\(",
            ),
            (
                ChunkKind::Function,
                r"^\s+(?:<[^>]+>\s+)?[\w<>\[\]?,.]+\s+(?P<name>\w+)\s*\([^;]*\)\s*(?:throws\s+[\w.,\s]+)?\{\s*$",
            ),
        ],
        r"^\s*(?:import|package)\s+[\w.*\s]+;",
        Some(r"^\s*@\w+"),
        CONTROL_WORDS,
    )
});

static CSHARP: LazyLock<BraceSyntax> = LazyLock::new(|| {
    BraceSyntax::new(
        C_FAMILY,
        &[
            (
                ChunkKind::Interface,
                r"^\s*(?:(?:public|protected|private|internal|static|partial|unsafe|new)\s+)*interface\s+\w+",
            ),
            (
                ChunkKind::Class,
                r"^\s*(?:(?:public|protected|private|internal|static|abstract|sealed|partial|readonly|unsafe|new|file)\s+)*(?:class|struct|record(?:\s+(?:class|struct))?|enum)\s+\w+",
            ),
            (ChunkKind::Module, r"^\s*namespace\s+[\w.]+"),
            (
                ChunkKind::Function,
                r"^\s*(?:(?:public|protected|private|internal|static|abstract|sealed|virtual|override|async|unsafe|extern|new|partial)\s+)+(?:[\w<>\[\]?,.]+\s+)*?(?P<name>\w+)\s*(?:<[^>]*>)?\s*\(",
            ),
        ],
        r"^\s*using\s+(?:static\s+)?[\w.]+(?:\s*=\s*[\w.<>]+)?\s*;",
        Some(r"^\s*\[\w+"),
        CONTROL_WORDS,
    )
});

static CPP: LazyLock<BraceSyntax> = LazyLock::new(|| {
    BraceSyntax::new(
        C_FAMILY,
        &[
            (
                ChunkKind::Class,
                r"^\s*(?:template\s*<.*>\s*)?(?:typedef\s+)?(?:class|struct|union|enum(?:\s+class)?)\b[^;()]*$",
            ),
            (ChunkKind::Module, r"^\s*(?:inline\s+)?namespace\b[^;]*$"),
            (ChunkKind::Type, r"^\s*(?:typedef\b|using\s+\w+\s*=)"),
            (
                ChunkKind::Function,
                r"^\s*(?:template\s*<.*>\s*)?(?:(?:static|inline|extern|virtual|constexpr|explicit|friend)\s+)*[A-Za-z_][\w:<>,]*(?:\s*[\*&]+\s*|\s+)(?:[\w:<>,]+(?:\s*[\*&]+\s*|\s+))*?(?P<name>~?[A-Za-z_][\w:~]*)\s*\([^;]*$",
            ),
            (ChunkKind::Function, r"^\s*(?P<name>\w+::~?\w+)\s*\([^;]*$"),
        ],
        r"^\s*#\s*(?:include|import)\b",
        None,
        CONTROL_WORDS,
    )
});

static GO: LazyLock<BraceSyntax> = LazyLock::new(|| {
    BraceSyntax::new(
        Lexical {
            line_comment: Some("//"),
            block_comments: true,
            quotes: &['"', '\'', '`'],
            multiline_quotes: &['`'],
            raw_quotes: &['`'],
            lifetimes: false,
        },
        &[
            (ChunkKind::Function, r"^func\s"),
            (
                ChunkKind::Interface,
                r"^type\s+\w+(?:\[[^\]]*\])?\s+interface\b",
            ),
            (ChunkKind::Class, r"^type\s+\w+(?:\[[^\]]*\])?\s+struct\b"),
            (ChunkKind::Type, r"^type\b"),
        ],
        r"^(?:import|package)\b",
        Some(r"^//"),
        CONTROL_WORDS,
    )
});

pub(super) fn syntax_for(lang: Lang) -> Option<&'static BraceSyntax> {
    match lang {
        Lang::Rust => Some(&*RUST),
        Lang::JavaScript => Some(&*JAVASCRIPT),
        Lang::TypeScript => Some(&*TYPESCRIPT),
        Lang::Java => Some(&*JAVA),
        Lang::CSharp => Some(&*CSHARP),
        Lang::Cpp => Some(&*CPP),
        Lang::Go => Some(&*GO),
        _ => None,
    }
}
