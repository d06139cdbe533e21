//! Just enough of a Python tokenizer to find top-level statement boundaries
//! and the names each statement binds or reads.
//!
//! Strings (every quote form, prefixes, triple quotes), comments, bracket
//! nesting and backslash continuations are tracked. String contents are
//! skipped except for the `{...}` fields of f-strings, whose names are
//! reported as ordinary references.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier. `attribute` is set when it directly follows a `.`.
    Name { text: String, attribute: bool },
    Punct(&'static str),
    Str,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Name { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_punct(&self, op: &str) -> bool {
        matches!(self.kind, TokenKind::Punct(p) if p == op)
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.name() == Some(name)
    }
}

/// Tokens of a source file plus, per physical line, whether that line
/// starts inside an unfinished construct (open bracket, triple-quoted
/// string or backslash continuation).
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub continued: Vec<bool>,
}

const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "==", "!=", "<=", ">=", ":=", "->", "+=", "-=", "*=",
    "/=", "%=", "&=", "|=", "^=", "@=", "**", "//", "<<", ">>", "(", ")", "[", "]", "{", "}",
    ",", ":", ";", ".", "=", "+", "-", "*", "/", "%", "&", "|", "^", "~", "<", ">", "@", "!",
];

const STRING_PREFIXES: &[&str] = &[
    "r", "u", "b", "f", "t", "br", "rb", "fr", "rf", "tr", "rt",
];

static FSTRING_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]*)\}").unwrap());
static FIELD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^.\w])([A-Za-z_][A-Za-z0-9_]*)").unwrap());

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    out: Lexed,
}

pub fn lex(source: &str) -> Lexed {
    let line_count = source.lines().count().max(1);
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 0,
        depth: 0,
        out: Lexed {
            tokens: Vec::new(),
            continued: vec![false; line_count + 1],
        },
    };
    lexer.run();
    lexer.out.continued.truncate(line_count);
    lexer.out
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn newline(&mut self, continued: bool) {
        self.line += 1;
        if let Some(slot) = self.out.continued.get_mut(self.line) {
            *slot = continued;
        }
    }

    fn push(&mut self, kind: TokenKind) {
        self.out.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn run(&mut self) {
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => {
                    self.pos += 1;
                    let continued = self.depth > 0;
                    self.newline(continued);
                }
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.newline(true);
                }
                '\\' if self.peek(1) == Some('\r') && self.peek(2) == Some('\n') => {
                    self.pos += 3;
                    self.newline(true);
                }
                '#' => {
                    while let Some(c) = self.peek(0) {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '\'' | '"' => self.string(false),
                c if c.is_ascii_digit() => self.number(),
                c if c == '_' || c.is_alphabetic() => self.word(),
                c if c.is_whitespace() => self.pos += 1,
                _ => self.operator(),
            }
        }
    }

    fn number(&mut self) {
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Number);
    }

    fn word(&mut self) {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c == '_' || c.is_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(0), Some('\'') | Some('"')) {
            let lower = text.to_ascii_lowercase();
            if STRING_PREFIXES.contains(&lower.as_str()) {
                self.string(lower.contains('f') || lower.contains('t'));
                return;
            }
        }

        let attribute = self
            .out
            .tokens
            .last()
            .is_some_and(|t| t.is_punct("."));
        self.push(TokenKind::Name { text, attribute });
    }

    fn string(&mut self, formatted: bool) {
        let quote = match self.peek(0) {
            Some(q) => q,
            None => return,
        };
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        let start_line = self.line;
        self.pos += if triple { 3 } else { 1 };

        let mut content = String::new();
        loop {
            let Some(c) = self.peek(0) else { break };
            if c == '\\' {
                if let Some(next) = self.peek(1) {
                    self.pos += 2;
                    if next == '\n' {
                        self.newline(true);
                    } else {
                        content.push(next);
                    }
                    continue;
                }
                self.pos += 1;
                continue;
            }
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    // Unterminated single-quoted string ends at the line break.
                    break;
                }
                self.pos += 1;
                self.newline(true);
                content.push('\n');
                continue;
            }
            content.push(c);
            self.pos += 1;
        }

        let end_line = self.line;
        self.line = start_line;
        self.push(TokenKind::Str);
        if formatted {
            for field in FSTRING_FIELD.captures_iter(&content) {
                for name in FIELD_NAME.captures_iter(&field[1]) {
                    self.push(TokenKind::Name {
                        text: name[1].to_string(),
                        attribute: false,
                    });
                }
            }
        }
        self.line = end_line;
    }

    fn operator(&mut self) {
        for op in OPERATORS {
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, oc)| self.peek(i) == Some(oc));
            if matches {
                self.pos += op.chars().count();
                match *op {
                    "(" | "[" | "{" => self.depth += 1,
                    ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                self.push(TokenKind::Punct(op));
                return;
            }
        }
        // Characters Python does not know ($, ?, `) are skipped.
        self.pos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(lexed: &Lexed) -> Vec<(String, bool)> {
        lexed
            .tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Name { text, attribute } => Some((text.clone(), *attribute)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_strings_and_comments_hide_names() {
        let lexed = lex("x = 'y' + \"z\"  # w\n");
        assert_eq!(names(&lexed), vec![("x".to_string(), false)]);
    }

    #[test]
    fn test_attribute_flag() {
        let lexed = lex("os.path.join(a)\n");
        assert_eq!(
            names(&lexed),
            vec![
                ("os".to_string(), false),
                ("path".to_string(), true),
                ("join".to_string(), true),
                ("a".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_open_bracket_marks_continuation() {
        let lexed = lex("x = foo(\n    1,\n)\ny = 2\n");
        assert_eq!(lexed.continued, vec![false, true, true, false]);
    }

    #[test]
    fn test_triple_quoted_string_marks_continuation() {
        let lexed = lex("DOC = \"\"\"\ndef fake():\n\"\"\"\nz = 1\n");
        assert_eq!(lexed.continued, vec![false, true, true, false]);
        assert!(!names(&lexed).iter().any(|(n, _)| n == "fake"));
    }

    #[test]
    fn test_backslash_continuation() {
        let lexed = lex("total = a + \\\n    b\n");
        assert_eq!(lexed.continued, vec![false, true]);
    }

    #[test]
    fn test_fstring_fields_are_references() {
        let lexed = lex("msg = f\"{PREFIX}-{value.name:>10}\"\n");
        let found = names(&lexed);
        assert!(found.contains(&("PREFIX".to_string(), false)));
        assert!(found.contains(&("value".to_string(), false)));
        assert!(!found.iter().any(|(n, _)| n == "name"));
    }

    #[test]
    fn test_prefixed_strings() {
        let lexed = lex("p = rb'\\d' + br\"x\"\n");
        assert_eq!(names(&lexed), vec![("p".to_string(), false)]);
    }

    #[test]
    fn test_comparison_is_not_assignment() {
        let lexed = lex("a == b\n");
        assert!(lexed.tokens.iter().any(|t| t.is_punct("==")));
        assert!(!lexed.tokens.iter().any(|t| t.is_punct("=")));
    }
}
