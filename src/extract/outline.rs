//! Top-level statement outline of a Python module
//!
//! A module is cut into its top-level statements. Each statement keeps its
//! original text together with the module-level names it binds and the
//! names it reads, which is what dependency selection works from.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;

use super::lexer::{lex, Token, TokenKind};

/// Marker comment naming the entry function of an extracted unit.
pub const ENTRY_MARKER: &str = "# nfmap: entry=";

static FUNCTION_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*[\(\[]").unwrap());
static CLASS_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^class\s+([A-Za-z_]\w*)").unwrap());
static MAIN_GUARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^if\s+(?:__name__\s*==\s*['"]__main__['"]|['"]__main__['"]\s*==\s*__name__)\s*:"#,
    )
    .unwrap()
});

const CLAUSE_KEYWORDS: &[&str] = &["elif", "else", "except", "finally"];

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Function { name: String },
    Class { name: String },
    Import { relative: bool, wildcard: bool },
    Assignment,
    MainGuard,
    Comment,
    /// Anything that binds no name we can see: expressions and top-level
    /// control-flow blocks.
    Other,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    /// Zero-based physical line range in the source.
    pub lines: Range<usize>,
    pub text: String,
    pub bound: BTreeSet<String>,
    pub referenced: BTreeSet<String>,
}

impl Statement {
    pub fn is_compound(&self) -> bool {
        self.lines.len() > 1
            || matches!(
                self.kind,
                StatementKind::Function { .. } | StatementKind::Class { .. }
            )
    }

    pub fn first_line(&self) -> usize {
        self.lines.start + 1
    }
}

#[derive(Debug, Default)]
pub struct ModuleOutline {
    pub statements: Vec<Statement>,
}

impl ModuleOutline {
    pub fn parse(source: &str) -> Self {
        let lexed = lex(source);
        let lines: Vec<&str> = source.lines().collect();
        let ranges = group_statements(&lines, &lexed.continued);

        let statements = ranges
            .into_iter()
            .map(|range| {
                let first_token = lexed.tokens.partition_point(|t| t.line < range.start);
                let last_token = lexed.tokens.partition_point(|t| t.line < range.end);
                build_statement(&lines, &lexed.continued, range, &lexed.tokens[first_token..last_token])
            })
            .collect();

        Self { statements }
    }

    pub fn functions<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (usize, &'a Statement)> + 'a {
        self.statements
            .iter()
            .enumerate()
            .filter(move |(_, stmt)| {
                matches!(&stmt.kind, StatementKind::Function { name: n } if n == name)
            })
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn is_indented(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}

fn first_word(line: &str) -> &str {
    let end = line
        .find(|c: char| !(c == '_' || c.is_alphanumeric()))
        .unwrap_or(line.len());
    &line[..end]
}

/// Split physical lines into top-level statement ranges.
///
/// Blank lines and column-zero comments are held back until the next
/// significant line shows whether the enclosing block continues.
fn group_statements(lines: &[&str], continued: &[bool]) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut awaiting_definition = false;
    let mut pending_start: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate() {
        let is_continuation = continued.get(idx).copied().unwrap_or(false);

        if !is_continuation && (is_blank(line) || is_comment(line)) {
            pending_start.get_or_insert(idx);
            continue;
        }

        let opens_statement = !is_continuation
            && !is_indented(line)
            && !(current.is_some() && CLAUSE_KEYWORDS.contains(&first_word(line)))
            && !awaiting_definition;

        if opens_statement {
            if let Some(range) = current.take() {
                ranges.push(range);
            }
            if let Some(start) = pending_start.take() {
                push_comment_runs(&mut ranges, lines, start..idx);
            }
            current = Some(idx..idx + 1);
        } else {
            pending_start = None;
            match current.as_mut() {
                Some(range) => range.end = idx + 1,
                None => current = Some(idx..idx + 1),
            }
        }

        if !is_continuation && !is_indented(line) {
            awaiting_definition = line.starts_with('@');
        }
    }

    if let Some(range) = current.take() {
        ranges.push(range);
    }
    if let Some(start) = pending_start.take() {
        push_comment_runs(&mut ranges, lines, start..lines.len());
    }
    ranges
}

/// Each run of adjacent comment lines inside a held-back gap becomes its own
/// statement; blank lines are dropped.
fn push_comment_runs(ranges: &mut Vec<Range<usize>>, lines: &[&str], gap: Range<usize>) {
    let mut run: Option<Range<usize>> = None;
    for idx in gap {
        if is_comment(lines[idx]) {
            match run.as_mut() {
                Some(r) => r.end = idx + 1,
                None => run = Some(idx..idx + 1),
            }
        } else if let Some(r) = run.take() {
            ranges.push(r);
        }
    }
    if let Some(r) = run {
        ranges.push(r);
    }
}

fn build_statement(
    lines: &[&str],
    continued: &[bool],
    range: Range<usize>,
    tokens: &[Token],
) -> Statement {
    let text = lines[range.clone()].join("\n");

    let header = range
        .clone()
        .find(|&idx| !continued.get(idx).copied().unwrap_or(false) && !lines[idx].starts_with('@'))
        .map(|idx| lines[idx])
        .unwrap_or("");

    let referenced = references(tokens);

    if range.clone().all(|idx| is_comment(lines[idx])) {
        return Statement {
            kind: StatementKind::Comment,
            lines: range,
            text,
            bound: BTreeSet::new(),
            referenced: BTreeSet::new(),
        };
    }

    if MAIN_GUARD.is_match(header) {
        return Statement {
            kind: StatementKind::MainGuard,
            lines: range,
            text,
            bound: BTreeSet::new(),
            referenced,
        };
    }

    if let Some(caps) = FUNCTION_HEADER.captures(header) {
        let name = caps[1].to_string();
        return Statement {
            kind: StatementKind::Function { name: name.clone() },
            lines: range,
            text,
            bound: BTreeSet::from([name]),
            referenced,
        };
    }

    if let Some(caps) = CLASS_HEADER.captures(header) {
        let name = caps[1].to_string();
        return Statement {
            kind: StatementKind::Class { name: name.clone() },
            lines: range,
            text,
            bound: BTreeSet::from([name]),
            referenced,
        };
    }

    match first_word(header) {
        "import" | "from" => {
            let (bound, relative, wildcard) = import_bindings(tokens);
            Statement {
                kind: StatementKind::Import { relative, wildcard },
                lines: range,
                text,
                bound,
                referenced: BTreeSet::new(),
            }
        }
        word if KEYWORDS.contains(&word) || is_match_block(word, header) => Statement {
            kind: StatementKind::Other,
            lines: range,
            text,
            bound: BTreeSet::new(),
            referenced,
        },
        _ => {
            let bound = assignment_targets(tokens);
            let kind = if bound.is_empty() {
                StatementKind::Other
            } else {
                StatementKind::Assignment
            };
            Statement {
                kind,
                lines: range,
                text,
                bound,
                referenced,
            }
        }
    }
}

/// `match` is a soft keyword: `match x:` opens a block, `match = 1` binds.
fn is_match_block(word: &str, header: &str) -> bool {
    word == "match" && header.trim_end().ends_with(':')
}

fn references(tokens: &[Token]) -> BTreeSet<String> {
    tokens
        .iter()
        .filter_map(|t| match &t.kind {
            TokenKind::Name {
                text,
                attribute: false,
            } if !KEYWORDS.contains(&text.as_str()) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Names bound by `import ...` / `from ... import ...`, plus whether the
/// import is relative and whether it is a star import.
fn import_bindings(tokens: &[Token]) -> (BTreeSet<String>, bool, bool) {
    let mut bound = BTreeSet::new();
    let is_from = tokens.first().is_some_and(|t| t.is_name("from"));

    let relative = is_from
        && tokens
            .get(1)
            .is_some_and(|t| t.is_punct(".") || t.is_punct("..."));

    let names_start = if is_from {
        match tokens.iter().position(|t| t.is_name("import")) {
            Some(pos) => pos + 1,
            None => return (bound, relative, false),
        }
    } else {
        1
    };

    let mut wildcard = false;
    let clauses = tokens
        .get(names_start..)
        .unwrap_or(&[])
        .split(|t| t.is_punct(",") || t.is_punct(";"))
        .map(|clause| {
            clause
                .iter()
                .filter(|t| !t.is_punct("(") && !t.is_punct(")"))
                .collect::<Vec<_>>()
        });

    for clause in clauses {
        if clause.iter().any(|t| t.is_punct("*")) {
            wildcard = true;
            continue;
        }
        let alias = clause
            .iter()
            .position(|t| t.is_name("as"))
            .and_then(|pos| clause.get(pos + 1))
            .and_then(|t| t.name());
        let binding = alias.or_else(|| clause.first().and_then(|t| t.name()));
        if let Some(name) = binding {
            bound.insert(name.to_string());
        }
    }

    (bound, relative, wildcard)
}

/// Plain names bound by an assignment statement at the top level.
///
/// Subscript and attribute targets (`x[0] = 1`, `obj.a = 1`) bind nothing.
fn assignment_targets(tokens: &[Token]) -> BTreeSet<String> {
    let mut depth = 0usize;
    let mut split_points = Vec::new();
    let mut annotation_at = None;

    for (idx, token) in tokens.iter().enumerate() {
        match &token.kind {
            TokenKind::Punct("(" | "[" | "{") => depth += 1,
            TokenKind::Punct(")" | "]" | "}") => depth = depth.saturating_sub(1),
            TokenKind::Punct(
                "=" | "+=" | "-=" | "*=" | "/=" | "//=" | "%=" | "**=" | ">>=" | "<<=" | "&="
                | "|=" | "^=" | "@=",
            ) if depth == 0 => split_points.push(idx),
            TokenKind::Punct(":") if depth == 0 && split_points.is_empty() => {
                annotation_at.get_or_insert(idx);
            }
            TokenKind::Name { text, .. } if depth == 0 && text == "lambda" => break,
            _ => {}
        }
    }

    let mut bound = BTreeSet::new();
    let mut start = 0;
    let target_ends: Vec<usize> = if split_points.is_empty() {
        annotation_at.into_iter().collect()
    } else {
        split_points
    };

    for end in target_ends {
        let target_end = match annotation_at {
            Some(colon) if colon < end => colon,
            _ => end,
        };
        collect_target_names(&tokens[start.min(target_end)..target_end], &mut bound);
        start = end + 1;
    }
    bound
}

fn collect_target_names(target: &[Token], bound: &mut BTreeSet<String>) {
    let mut subscript_depth = 0usize;
    for (idx, token) in target.iter().enumerate() {
        match &token.kind {
            TokenKind::Punct("[") => subscript_depth += 1,
            TokenKind::Punct("]") => subscript_depth = subscript_depth.saturating_sub(1),
            TokenKind::Name {
                text,
                attribute: false,
            } if subscript_depth == 0 && !KEYWORDS.contains(&text.as_str()) => {
                let followed_by_access = target
                    .get(idx + 1)
                    .is_some_and(|next| next.is_punct("[") || next.is_punct(".") || next.is_punct("("));
                if !followed_by_access {
                    bound.insert(text.clone());
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(outline: &ModuleOutline) -> Vec<StatementKind> {
        outline.statements.iter().map(|s| s.kind.clone()).collect()
    }

    fn bound(stmt: &Statement) -> Vec<&str> {
        stmt.bound.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_functions_and_imports() {
        let source = "import os\nfrom typing import List as L, Dict\n\ndef f(x):\n    return x\n\n\ndef g():\n    pass\n";
        let outline = ModuleOutline::parse(source);

        assert_eq!(outline.statements.len(), 4);
        assert_eq!(bound(&outline.statements[0]), vec!["os"]);
        assert_eq!(bound(&outline.statements[1]), vec!["Dict", "L"]);
        assert_eq!(outline.statements[2].text, "def f(x):\n    return x");
        assert_eq!(outline.statements[3].lines, 7..9);
    }

    #[test]
    fn test_blank_lines_inside_function_are_kept() {
        let source = "def f():\n    a = 1\n\n    return a\nX = 2\n";
        let outline = ModuleOutline::parse(source);

        assert_eq!(outline.statements.len(), 2);
        assert_eq!(outline.statements[0].text, "def f():\n    a = 1\n\n    return a");
        assert_eq!(outline.statements[1].kind, StatementKind::Assignment);
    }

    #[test]
    fn test_decorators_attach_to_definition() {
        let source = "@cache\n@wrap(\n    level=2,\n)\ndef f():\n    pass\n";
        let outline = ModuleOutline::parse(source);

        assert_eq!(outline.statements.len(), 1);
        assert_eq!(
            outline.statements[0].kind,
            StatementKind::Function {
                name: "f".to_string()
            }
        );
        assert!(outline.statements[0].referenced.contains("cache"));
        assert!(outline.statements[0].referenced.contains("wrap"));
    }

    #[test]
    fn test_clause_keywords_continue_statement() {
        let source = "try:\n    import numpy\nexcept ImportError:\n    numpy = None\nfinally:\n    pass\n";
        let outline = ModuleOutline::parse(source);

        assert_eq!(kinds(&outline), vec![StatementKind::Other]);
        assert_eq!(outline.statements[0].lines, 0..6);
    }

    #[test]
    fn test_column_zero_comment_inside_function() {
        let source = "def f():\n    a = 1\n# note\n    return a\n";
        let outline = ModuleOutline::parse(source);

        assert_eq!(outline.statements.len(), 1);
        assert_eq!(outline.statements[0].lines, 0..4);
    }

    #[test]
    fn test_comment_between_statements() {
        let source = "A = 1\n\n# about B\nB = 2\n";
        let outline = ModuleOutline::parse(source);

        assert_eq!(
            kinds(&outline),
            vec![
                StatementKind::Assignment,
                StatementKind::Comment,
                StatementKind::Assignment
            ]
        );
    }

    #[test]
    fn test_main_guard_both_quotes() {
        for guard in ["if __name__ == '__main__':", "if __name__ == \"__main__\":"] {
            let source = format!("{guard}\n    main()\n");
            let outline = ModuleOutline::parse(&source);
            assert_eq!(kinds(&outline), vec![StatementKind::MainGuard]);
        }
    }

    #[test]
    fn test_multiline_string_with_fake_def() {
        let source = "DOC = \"\"\"\ndef hidden():\n    pass\n\"\"\"\n";
        let outline = ModuleOutline::parse(source);

        assert_eq!(outline.statements.len(), 1);
        assert_eq!(bound(&outline.statements[0]), vec!["DOC"]);
    }

    #[test]
    fn test_assignment_targets() {
        let cases: &[(&str, &[&str])] = &[
            ("a, b = 1, 2", &["a", "b"]),
            ("x: int = 3", &["x"]),
            ("y: str", &["y"]),
            ("c = d = compute(k=1)", &["c", "d"]),
            ("total += 1", &["total"]),
            ("f = lambda v=1: v", &["f"]),
            ("obj.attr = 1", &[]),
            ("table[key] = 1", &[]),
        ];
        for (source, expected) in cases {
            let outline = ModuleOutline::parse(source);
            assert_eq!(&bound(&outline.statements[0]), expected, "source: {source}");
        }
    }

    #[test]
    fn test_relative_and_star_imports() {
        let outline = ModuleOutline::parse("from . import sibling\nfrom os.path import *\n");

        assert_eq!(
            outline.statements[0].kind,
            StatementKind::Import {
                relative: true,
                wildcard: false
            }
        );
        assert_eq!(bound(&outline.statements[0]), vec!["sibling"]);
        assert_eq!(
            outline.statements[1].kind,
            StatementKind::Import {
                relative: false,
                wildcard: true
            }
        );
    }

    #[test]
    fn test_parenthesised_from_import() {
        let outline = ModuleOutline::parse("from pkg import (\n    one,\n    two as second,\n)\n");

        assert_eq!(outline.statements.len(), 1);
        assert_eq!(bound(&outline.statements[0]), vec!["one", "second"]);
    }

    #[test]
    fn test_async_def() {
        let outline = ModuleOutline::parse("async def fetch(url):\n    return url\n");
        assert_eq!(
            outline.statements[0].kind,
            StatementKind::Function {
                name: "fetch".to_string()
            }
        );
    }
}
