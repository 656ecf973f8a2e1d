//! Diagnostics for the hacheck configuration validator.
//!
//! Provides [`Diagnostic`], [`Severity`], [`Stage`], and [`LineIndex`] types
//! used to report findings from the loader, the reference resolver and the
//! controller-semantic checker. Diagnostic codes are defined in the
//! [`codes`] module.

#![warn(missing_docs)]

/// Diagnostic ID constants.
pub mod codes;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

// ── LineIndex ────────────────────────────────────────────────────────────

/// Maps byte offsets in a source string to 1-indexed line numbers.
///
/// Built in O(n); each lookup is a binary search over line starts.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the start of each line. `line_starts[0]` is always 0.
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Build a `LineIndex` from source text.
    pub fn new(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// Build a `LineIndex` from raw bytes (which need not be valid UTF-8).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut line_starts = vec![0usize];
        line_starts.extend(
            bytes
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// 1-indexed line number containing `offset`.
    ///
    /// Offsets past the end of the source map to the last line.
    pub fn line_number(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact + 1,
            Err(next) => next,
        }
    }

    /// Total number of lines (at least 1, even for empty input).
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

// ── Severity / Stage ─────────────────────────────────────────────────────

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocking: the run fails.
    Error,
    /// Non-blocking: reported, never fails the run.
    Warning,
}

/// The validation stage that produced a diagnostic.
///
/// Ordered by execution order, which is also the order diagnostics sharing
/// a line are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Stage 1: tagged document loading.
    Syntax,
    /// Stage 2: reference resolution against the registry.
    Reference,
    /// Stage 3: controller-semantic checking by the external collaborator.
    Semantic,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Syntax, Stage::Reference, Stage::Semantic];

    /// Lowercase stage name as used on the command line and in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Syntax => "syntax",
            Stage::Reference => "reference",
            Stage::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g., `"HAC2001"`).
    pub id: Cow<'static, str>,
    /// Severity level.
    pub severity: Severity,
    /// Stage that produced this diagnostic.
    pub stage: Stage,
    /// File the finding refers to, relative to the configuration directory
    /// when possible. Absent for run-level findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-indexed line. Absent when the producer has no precise location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Human-readable message.
    pub message: String,
    /// Suggested alternative identifiers, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Machine-readable context for tooling. `BTreeMap` keeps serialized key
    /// order deterministic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, String>>,
}

impl Diagnostic {
    /// Create a diagnostic without a location.
    pub fn new(
        id: impl Into<Cow<'static, str>>,
        severity: Severity,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            stage,
            file: None,
            line: None,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    /// Shorthand for an `Error` diagnostic.
    pub fn error(
        id: impl Into<Cow<'static, str>>,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        Self::new(id, Severity::Error, stage, message)
    }

    /// Shorthand for a `Warning` diagnostic.
    pub fn warning(
        id: impl Into<Cow<'static, str>>,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        Self::new(id, Severity::Warning, stage, message)
    }

    /// Attach a file and an optional line (builder pattern).
    pub fn at(mut self, file: impl Into<String>, line: Option<usize>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    /// Attach suggested alternatives (builder pattern).
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Attach machine-readable context metadata (builder pattern).
    pub fn with_context(mut self, ctx: BTreeMap<String, String>) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Whether this diagnostic blocks the run.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Returns the human-readable explanation for this diagnostic's code, if available.
    pub fn explain(&self) -> Option<&'static str> {
        explain(&self.id)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.id, self.message)
    }
}

/// Returns the human-readable explanation for a diagnostic code, if known.
pub fn explain(id: &str) -> Option<&'static str> {
    codes::explain(id)
}
