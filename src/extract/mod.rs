//! Function extraction
//!
//! Turns one top-level function of a Python source file into a standalone
//! script that can be shipped to a compute node. The script holds the
//! module-level statements the function depends on, the function itself,
//! and a no-op `__main__` guard so running it directly has no side effects.
//!
//! Relative imports (`from . import x`) are carried over verbatim but cannot
//! resolve outside the original package; they are reported as warnings.

mod lexer;
pub mod outline;


use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use outline::{ModuleOutline, Statement, StatementKind, ENTRY_MARKER};

const MAIN_SENTINEL: &str = "if __name__ == \"__main__\":\n    pass\n";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Function {function} not found in {origin}")]
    NotFound { function: String, origin: String },

    #[error("Invalid function name: {0:?}")]
    InvalidName(String),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which module-level statements accompany the extracted function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DependencyMode {
    /// Definitions, imports and assignments reachable from the function's
    /// names, plus every statement that binds nothing (side effects).
    #[default]
    Referenced,
    /// Every other top-level statement.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractWarning {
    RelativeImport { line: usize, text: String },
    DuplicateDefinition { function: String, count: usize },
}

impl std::fmt::Display for ExtractWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractWarning::RelativeImport { line, text } => write!(
                f,
                "line {line}: relative import `{text}` will not resolve on the compute node"
            ),
            ExtractWarning::DuplicateDefinition { function, count } => write!(
                f,
                "{function} is defined {count} times; the last definition is used"
            ),
        }
    }
}

/// The result of extracting one function.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub function_name: String,
    /// Full definition text, decorators included.
    pub function_source: String,
    /// Dependency statements in source order.
    pub dependencies: Vec<String>,
    pub warnings: Vec<ExtractWarning>,
    dependency_spacing: Vec<bool>,
}

impl Extraction {
    /// Render the standalone script.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(ENTRY_MARKER);
        out.push_str(&self.function_name);
        out.push('\n');

        for (idx, dependency) in self.dependencies.iter().enumerate() {
            let spaced = self.dependency_spacing[idx];
            let after_spaced = idx > 0 && self.dependency_spacing[idx - 1];
            if idx > 0 && (spaced || after_spaced) {
                out.push('\n');
            }
            out.push_str(dependency);
            out.push('\n');
        }

        out.push_str("\n\n");
        out.push_str(&self.function_source);
        out.push_str("\n\n\n");
        out.push_str(MAIN_SENTINEL);
        out
    }
}

/// Read the entry function name from an extracted script.
pub fn read_entry_point(script: &str) -> Option<String> {
    script
        .lines()
        .find_map(|line| line.strip_prefix(ENTRY_MARKER))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct SourceExtractor {
    mode: DependencyMode,
}

impl SourceExtractor {
    pub fn new(mode: DependencyMode) -> Self {
        Self { mode }
    }

    /// Extract `function` from in-memory source. `origin` names the source in errors.
    pub fn extract(
        &self,
        source: &str,
        function: &str,
        origin: &str,
    ) -> Result<Extraction, ExtractError> {
        if !is_identifier(function) {
            return Err(ExtractError::InvalidName(function.to_string()));
        }

        let outline = ModuleOutline::parse(source);
        let definitions: Vec<usize> = outline.functions(function).map(|(idx, _)| idx).collect();

        let Some(&target_idx) = definitions.last() else {
            return Err(ExtractError::NotFound {
                function: function.to_string(),
                origin: origin.to_string(),
            });
        };

        let mut warnings = Vec::new();
        if definitions.len() > 1 {
            warnings.push(ExtractWarning::DuplicateDefinition {
                function: function.to_string(),
                count: definitions.len(),
            });
        }

        let selected = match self.mode {
            DependencyMode::Referenced => select_referenced(&outline, target_idx, function),
            DependencyMode::All => select_all(&outline, target_idx, function),
        };

        for stmt in selected.iter().map(|&idx| &outline.statements[idx]) {
            if let StatementKind::Import { relative: true, .. } = stmt.kind {
                warnings.push(ExtractWarning::RelativeImport {
                    line: stmt.first_line(),
                    text: stmt.text.lines().next().unwrap_or_default().trim().to_string(),
                });
            }
        }

        for warning in &warnings {
            warn!("{}: {}", origin, warning);
        }

        debug!(
            "Extracted {} from {} with {} dependency statements",
            function,
            origin,
            selected.len()
        );

        Ok(Extraction {
            function_name: function.to_string(),
            function_source: outline.statements[target_idx].text.clone(),
            dependencies: selected
                .iter()
                .map(|&idx| outline.statements[idx].text.clone())
                .collect(),
            dependency_spacing: selected
                .iter()
                .map(|&idx| outline.statements[idx].is_compound())
                .collect(),
            warnings,
        })
    }

    /// Extract `function` from `input` and write the standalone script to `output`.
    ///
    /// Nothing is written when extraction fails.
    pub fn extract_file(
        &self,
        input: &Path,
        function: &str,
        output: &Path,
    ) -> Result<Extraction, ExtractError> {
        let source = std::fs::read_to_string(input).map_err(|source| ExtractError::Read {
            path: input.to_path_buf(),
            source,
        })?;

        let extraction = self.extract(&source, function, &input.display().to_string())?;
        write_atomically(output, &extraction.render())?;

        info!(
            "Function {} has been extracted and rewritten to {}",
            function,
            output.display()
        );
        Ok(extraction)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

fn is_entry_marker(stmt: &Statement) -> bool {
    stmt.kind == StatementKind::Comment && stmt.text.trim_start().starts_with(ENTRY_MARKER)
}

/// Module-level code naming the target runs before the rendered definition
/// exists. Function bodies are deferred until call time.
fn runs_before_target(stmt: &Statement, function: &str) -> bool {
    !matches!(stmt.kind, StatementKind::Function { .. })
        && (stmt.referenced.contains(function) || stmt.bound.contains(function))
}

fn select_all(outline: &ModuleOutline, target_idx: usize, function: &str) -> Vec<usize> {
    outline
        .statements
        .iter()
        .enumerate()
        .filter(|(idx, stmt)| {
            *idx != target_idx
                && stmt.kind != StatementKind::MainGuard
                && !is_entry_marker(stmt)
                && !runs_before_target(stmt, function)
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Closure over module-level names reachable from the target.
///
/// Statements that bind nothing visible are always kept, as they may
/// configure state the function relies on, unless they name the target.
fn select_referenced(outline: &ModuleOutline, target_idx: usize, function: &str) -> Vec<usize> {
    let statements = &outline.statements;
    let mut included = vec![false; statements.len()];
    let mut needed: BTreeSet<String> = statements[target_idx].referenced.clone();

    let candidate = |idx: usize, stmt: &Statement| {
        idx != target_idx
            && !matches!(stmt.kind, StatementKind::MainGuard | StatementKind::Comment)
            && !stmt.bound.contains(function)
            && !runs_before_target(stmt, function)
    };

    for (idx, stmt) in statements.iter().enumerate() {
        if !candidate(idx, stmt) {
            continue;
        }
        let always = matches!(
            stmt.kind,
            StatementKind::Other | StatementKind::Import { wildcard: true, .. }
        );
        if always {
            included[idx] = true;
            needed.extend(stmt.referenced.iter().cloned());
        }
    }

    loop {
        let mut changed = false;
        for (idx, stmt) in statements.iter().enumerate() {
            if included[idx] || !candidate(idx, stmt) {
                continue;
            }
            if stmt.bound.iter().any(|name| needed.contains(name)) {
                included[idx] = true;
                needed.extend(stmt.referenced.iter().cloned());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    included
        .iter()
        .enumerate()
        .filter(|(_, keep)| **keep)
        .map(|(idx, _)| idx)
        .collect()
}

fn write_atomically(output: &Path, contents: &str) -> Result<(), ExtractError> {
    let write_err = |source: std::io::Error| ExtractError::Write {
        path: output.to_path_buf(),
        source,
    };

    let parent = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(output).map_err(|e| write_err(e.error))?;
    Ok(())
}
