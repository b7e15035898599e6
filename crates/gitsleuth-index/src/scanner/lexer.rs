//! Line-at-a-time lexer that hides string literals and comments from the bracket counter.

use std::ops::ControlFlow;

/// Lexical conventions of a brace-delimited language.
#[derive(Debug)]
pub(crate) struct Lexical {
    pub line_comment: Option<&'static str>,
    pub block_comments: bool,
    pub quotes: &'static [char],
    /// Quotes whose literals may continue onto the next line.
    pub multiline_quotes: &'static [char],
    /// Quotes in which a backslash is an ordinary character.
    pub raw_quotes: &'static [char],
    /// Treat `'ident` as a lifetime rather than an unterminated char literal.
    pub lifetimes: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Code,
    Str(char),
    BlockComment,
}

#[derive(Debug)]
pub(crate) struct Lexer<'a> {
    lexical: &'a Lexical,
    state: State,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(lexical: &'a Lexical) -> Self {
        Self {
            lexical,
            state: State::Code,
        }
    }

    /// Close single-line string literals left open by the previous line.
    pub(crate) fn begin_line(&mut self) {
        if let State::Str(q) = self.state
            && !self.lexical.multiline_quotes.contains(&q)
        {
            self.state = State::Code;
        }
    }

    pub(crate) fn in_code(&self) -> bool {
        self.state == State::Code
    }

    /// Feed one line, calling `on_code` for every character outside literals and comments.
    pub(crate) fn scan_line<F>(&mut self, line: &str, mut on_code: F) -> ControlFlow<()>
    where
        F: FnMut(char) -> ControlFlow<()>,
    {
        self.begin_line();
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match self.state {
                State::BlockComment => {
                    if c == '*' && chars.get(i + 1) == Some(&'/') {
                        self.state = State::Code;
                        i += 1;
                    }
                }
                State::Str(q) => {
                    if c == '\\' && !self.lexical.raw_quotes.contains(&q) {
                        i += 1;
                    } else if c == q {
                        self.state = State::Code;
                    }
                }
                State::Code => {
                    if let Some(marker) = self.lexical.line_comment
                        && starts_with_at(&chars, i, marker)
                    {
                        break;
                    }
                    if self.lexical.block_comments && c == '/' && chars.get(i + 1) == Some(&'*') {
                        self.state = State::BlockComment;
                        i += 2;
                        continue;
                    }
                    if self.lexical.quotes.contains(&c) {
                        if c == '\'' && self.lexical.lifetimes && !is_char_literal(&chars, i) {
                            on_code(c)?;
                        } else {
                            self.state = State::Str(c);
                        }
                    } else {
                        on_code(c)?;
                    }
                }
            }
            i += 1;
        }
        ControlFlow::Continue(())
    }
}

fn starts_with_at(chars: &[char], at: usize, marker: &str) -> bool {
    let mut idx = at;
    for m in marker.chars() {
        if chars.get(idx) != Some(&m) {
            return false;
        }
        idx += 1;
    }
    true
}

/// `'x'` and `'\n'` are char literals; `'a` in `&'a str` is a lifetime.
fn is_char_literal(chars: &[char], quote: usize) -> bool {
    match chars.get(quote + 1) {
        Some('\\') => true,
        Some(_) => chars.get(quote + 2) == Some(&'\''),
        None => false,
    }
}

/// For each line, whether it starts outside any literal or block comment.
pub(crate) fn code_line_starts(lines: &[&str], lexical: &Lexical) -> Vec<bool> {
    let mut lexer = Lexer::new(lexical);
    lines
        .iter()
        .map(|line| {
            lexer.begin_line();
            let starts_in_code = lexer.in_code();
            let _ = lexer.scan_line(line, |_| ControlFlow::Continue(()));
            starts_in_code
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const C_LIKE: Lexical = Lexical {
        line_comment: Some("//"),
        block_comments: true,
        quotes: &['"', '\''],
        multiline_quotes: &[],
        raw_quotes: &[],
        lifetimes: false,
    };

    const RUST_LIKE: Lexical = Lexical {
        line_comment: Some("//"),
        block_comments: true,
        quotes: &['"', '\''],
        multiline_quotes: &['"'],
        raw_quotes: &[],
        lifetimes: true,
    };

    fn code_chars(lexical: &Lexical, line: &str) -> String {
        let mut out = String::new();
        let _ = Lexer::new(lexical).scan_line(line, |c| {
            out.push(c);
            ControlFlow::Continue(())
        });
        out
    }

    #[test]
    fn strings_and_comments_are_hidden() {
        assert_eq!(code_chars(&C_LIKE, r#"foo("{") { // }"#), "foo() { ");
        assert_eq!(code_chars(&C_LIKE, r"x = '}'; /* { */ y"), "x = ;  y");
    }

    #[test]
    fn escaped_quote_stays_in_string() {
        assert_eq!(code_chars(&C_LIKE, r#"s = "a\"{"; {"#), "s = ; {");
    }

    #[test]
    fn lifetimes_are_code() {
        assert_eq!(
            code_chars(&RUST_LIKE, "fn f<'a>(x: &'a str) -> char { '{' }"),
            "fn f<'a>(x: &'a str) -> char {  }"
        );
    }

    #[test]
    fn block_comment_spans_lines() {
        let lines = ["/* start", "still { comment", "end */ fn x() {", "}"];
        assert_eq!(
            code_line_starts(&lines, &C_LIKE),
            vec![true, false, false, true]
        );
    }

    #[test]
    fn single_line_strings_reset_at_line_end() {
        let lines = ["x = \"unterminated", "y = 1"];
        assert_eq!(code_line_starts(&lines, &C_LIKE), vec![true, true]);
        assert_eq!(code_line_starts(&lines, &RUST_LIKE), vec![true, false]);
    }
}
