//! hacheck core library.
//!
//! Offline validation of a home-automation configuration tree before it is
//! deployed: the tagged document [`Loader`], the reference extractor
//! ([`extract()`]), the layered [`Validator`] pipeline and the [`report`]
//! renderers. The registry index lives in `hacheck_registry`; diagnostic
//! types in `hacheck_diagnostics`.

#![warn(missing_docs)]

/// Validator configuration.
pub mod config;
/// Tagged YAML documents: node tree, parser and include-closure loader.
pub mod document;
/// Reference extraction from document trees and template expressions.
pub mod extract;
/// Report ordering and rendering.
pub mod report;
/// The three-stage validation pipeline.
pub mod validate;

// ── Convenience re-exports ──────────────────────────────────────────────────

// Documents
pub use document::{
    ConfigDocument, DocumentSet, IncludeMode, Loader, Node, NodeKind, ParseError, ParseErrorKind,
    TagKind, parse_bytes,
};

// Extraction
pub use extract::{ContextKind, ReferenceKeys, ReferenceSite, extract};

// Pipeline
pub use validate::{
    RunError, Scope, StageResult, StageStatus, ValidationRun, Validator, Verdict, validate,
};

// Configuration
pub use config::{ConfigError, ValidatorConfig};

// Reporting
pub use report::{RenderedReport, ReportFormat, render};

// Diagnostics and registry (re-exported from their crates)
pub use hacheck_diagnostics::{Diagnostic, Severity, Stage, codes, explain};
pub use hacheck_registry::{RegistryError, RegistryIndex, ResourceKind, ResourceRecord, SearchQuery};
