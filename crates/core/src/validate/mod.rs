//! The layered validation pipeline.
//!
//! A run loads the registry first (a missing or corrupt snapshot aborts the
//! run before any stage), then executes up to three stages in order:
//!
//! 1. **syntax**: load the include closure of the scope; every load failure
//!    is an error diagnostic;
//! 2. **reference**: extract references from every document that loaded,
//!    resolve them against the registry and local declarations, and check
//!    the shape of every automation;
//! 3. **semantic**: hand the directory to the external collaborator.
//!
//! Syntax failures never stop later stages from running on the files that
//! did load, so one run reports everything fixable at once. The verdict is
//! `failed` as soon as any stage produced an error.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hacheck_diagnostics::{Diagnostic, Severity, Stage};
use hacheck_registry::{RegistryCache, RegistryError, RegistryIndex};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, ValidatorConfig};
use crate::document::{ConfigDocument, DocumentSet, Loader, ParseError};
use crate::extract::{ReferenceKeys, ReferenceSite, extract};
use crate::report::sort_diagnostics;

/// Shorthand for building a `BTreeMap<String, String>` context from key-value pairs.
macro_rules! ctx {
    ($($k:expr => $v:expr),+ $(,)?) => {
        BTreeMap::from([$(($k.into(), $v.into())),+])
    };
}

pub mod declarations;
pub mod reference;
pub mod semantic;
pub mod structure;
pub mod suggest;

pub use declarations::LocalDeclarations;
pub use reference::check_references;
pub use semantic::{SemanticConfig, check_semantics};
pub use structure::check_automations;
pub use suggest::suggest;

/// Which files a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The entry file and everything it includes.
    All,
    /// One file and everything it includes.
    File(PathBuf),
}

impl Scope {
    /// `all` or a path.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("all") {
            Scope::All
        } else {
            Scope::File(PathBuf::from(s))
        }
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Ran and produced no error.
    Passed,
    /// Ran and produced at least one error.
    Failed,
    /// Not run (not requested, or stage 3 without a collaborator).
    Skipped,
}

/// Per-stage summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageResult {
    /// The stage.
    pub stage: Stage,
    /// Its outcome.
    pub status: StageStatus,
    /// Error diagnostics it produced.
    pub errors: usize,
    /// Warning diagnostics it produced.
    pub warnings: usize,
}

impl StageResult {
    fn ran(stage: Stage, diags: &[Diagnostic]) -> Self {
        let errors = diags.iter().filter(|d| d.is_error()).count();
        Self {
            stage,
            status: if errors > 0 {
                StageStatus::Failed
            } else {
                StageStatus::Passed
            },
            errors,
            warnings: diags.len() - errors,
        }
    }

    fn skipped(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            errors: 0,
            warnings: 0,
        }
    }
}

/// Run verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Not yet decided.
    Pending,
    /// No stage produced an error.
    Passed,
    /// At least one stage produced an error.
    Failed,
}

/// One validation run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationRun {
    /// `all` or the scoped file's display path.
    pub scope: String,
    /// Stage summaries in execution order.
    pub stages: Vec<StageResult>,
    /// Final verdict.
    pub verdict: Verdict,
    /// Every diagnostic, in report order.
    pub diagnostics: Vec<Diagnostic>,
    /// Wall-clock duration. Never rendered.
    #[serde(skip)]
    pub duration: Duration,
}

impl ValidationRun {
    fn new(scope: String) -> Self {
        Self {
            scope,
            stages: Vec::with_capacity(Stage::ALL.len()),
            verdict: Verdict::Pending,
            diagnostics: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    fn record(&mut self, stage: Stage, diags: Vec<Diagnostic>) {
        self.stages.push(StageResult::ran(stage, &diags));
        self.diagnostics.extend(diags);
    }

    fn finish(&mut self) {
        sort_diagnostics(&mut self.diagnostics);
        self.verdict = if self.diagnostics.iter().any(Diagnostic::is_error) {
            Verdict::Failed
        } else {
            Verdict::Passed
        };
    }

    /// Whether the verdict is `passed`.
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    /// Number of diagnostics with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == severity).count()
    }
}

/// A run that could not start.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RunError {
    /// The registry snapshot is missing or unusable.
    #[error("registry unavailable: {0}")]
    Registry(#[from] RegistryError),

    /// The validator configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RunError {
    /// What the user should do about it.
    pub fn remediation(&self) -> &'static str {
        match self {
            RunError::Registry(_) => {
                "sync the controller's .storage registry files into the configuration directory, or pass --registry <FILE>"
            }
            RunError::Config(_) => "fix the validator configuration file (hacheck.json or --config)",
        }
    }
}

/// A validation session over one configuration directory.
///
/// The registry index is cached between runs and rebuilt whenever a
/// snapshot file changes on disk.
#[derive(Debug)]
pub struct Validator {
    config: ValidatorConfig,
    loader: Loader,
    registry: RegistryCache,
    keys: ReferenceKeys,
}

impl Validator {
    /// A session for `config`. Nothing is read until the first run.
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            loader: Loader::new(&config.config_dir),
            registry: RegistryCache::new(config.snapshot_sources()),
            keys: ReferenceKeys::default(),
            config,
        }
    }

    /// The session's configuration.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// The current registry index.
    pub fn registry(&mut self) -> Result<Arc<RegistryIndex>, RegistryError> {
        self.registry.get()
    }

    /// Run stages up to and including `until` over `scope`.
    pub fn validate(&mut self, scope: &Scope, until: Stage) -> Result<ValidationRun, RunError> {
        let start = Instant::now();
        let registry = self.registry.get()?;
        info!(records = registry.len(), "registry ready");

        let entry = self.config.entry_path();
        let (scope_label, set) = match scope {
            Scope::All => ("all".to_string(), self.loader.load_closure(&entry)),
            Scope::File(path) => {
                let path = self.config.resolve(path);
                (self.loader.display(&normalize(&path)), self.loader.load_closure(&path))
            }
        };
        let mut run = ValidationRun::new(scope_label);

        info!(stage = "syntax", "stage started");
        run.record(Stage::Syntax, set.failures.iter().map(syntax_diagnostic).collect());

        if until >= Stage::Reference {
            info!(stage = "reference", "stage started");
            let diags = self.reference_stage(scope, &set, &entry, &registry);
            run.record(Stage::Reference, diags);
        } else {
            run.stages.push(StageResult::skipped(Stage::Reference));
        }

        match &self.config.semantic.command {
            Some(_) if until >= Stage::Semantic => {
                info!(stage = "semantic", "stage started");
                // The collaborator always checks the whole tree; a file scope
                // keeps findings in the scoped file's own include closure.
                let closure: Option<HashSet<&str>> = match scope {
                    Scope::All => None,
                    Scope::File(_) => Some(
                        set.documents
                            .iter()
                            .map(|d| d.display.as_str())
                            .chain(set.failures.iter().map(|f| f.file.as_str()))
                            .collect(),
                    ),
                };
                let diags = check_semantics(&self.config.semantic, self.loader.root(), &registry, |d| {
                    match (&closure, d.file.as_deref()) {
                        (Some(files), Some(file)) => files.contains(file),
                        _ => true,
                    }
                });
                run.record(Stage::Semantic, diags);
            }
            _ => run.stages.push(StageResult::skipped(Stage::Semantic)),
        }

        run.finish();
        run.duration = start.elapsed();
        info!(
            scope = %run.scope,
            verdict = ?run.verdict,
            errors = run.count(Severity::Error),
            warnings = run.count(Severity::Warning),
            elapsed_ms = run.duration.as_millis() as u64,
            "validation finished"
        );
        Ok(run)
    }

    fn reference_stage(
        &self,
        scope: &Scope,
        set: &DocumentSet,
        entry: &Path,
        registry: &RegistryIndex,
    ) -> Vec<Diagnostic> {
        // A single file's references may point at helpers declared anywhere
        // in the tree, so declarations always come from the whole closure.
        let full;
        let declaring: Vec<_> = match scope {
            Scope::All => set.documents.iter().collect(),
            Scope::File(_) => {
                full = self.loader.load_closure(entry);
                full.documents.iter().chain(&set.documents).collect()
            }
        };
        let locals = LocalDeclarations::collect(declaring, &self.config.builtin_entities);

        let secrets = std::fs::canonicalize(self.config.resolve(&self.config.secrets_file)).ok();
        let checked: Vec<&ConfigDocument> = set
            .documents
            .iter()
            .filter(|doc| secrets.as_deref() != Some(doc.path.as_path()))
            .collect();
        let sites: Vec<ReferenceSite> = checked
            .par_iter()
            .flat_map_iter(|doc| extract(doc, &self.keys))
            .collect();
        info!(references = sites.len(), locals = locals.len(), "references extracted");
        let mut diags = check_references(&sites, registry, &locals);
        diags.extend(check_automations(checked));
        diags
    }
}

/// One-shot run without keeping a session.
pub fn validate(config: ValidatorConfig, scope: &Scope, until: Stage) -> Result<ValidationRun, RunError> {
    Validator::new(config).validate(scope, until)
}

fn syntax_diagnostic(e: &ParseError) -> Diagnostic {
    Diagnostic::error(e.kind.code(), Stage::Syntax, e.message.clone())
        .at(&e.file, e.line)
        .with_context(ctx!("kind" => e.kind.as_str()))
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parsing() {
        assert_eq!(Scope::parse("all"), Scope::All);
        assert_eq!(Scope::parse("ALL"), Scope::All);
        assert_eq!(
            Scope::parse("automations.yaml"),
            Scope::File(PathBuf::from("automations.yaml"))
        );
    }

    #[test]
    fn stage_result_counts() {
        let diags = vec![
            Diagnostic::error("HAC2001", Stage::Reference, "a"),
            Diagnostic::warning("HAC2002", Stage::Reference, "b"),
            Diagnostic::warning("HAC2002", Stage::Reference, "c"),
        ];
        let r = StageResult::ran(Stage::Reference, &diags);
        assert_eq!(r.status, StageStatus::Failed);
        assert_eq!((r.errors, r.warnings), (1, 2));
        assert_eq!(StageResult::ran(Stage::Syntax, &[]).status, StageStatus::Passed);
    }

    #[test]
    fn warnings_alone_pass() {
        let mut run = ValidationRun::new("all".into());
        run.record(
            Stage::Reference,
            vec![Diagnostic::warning("HAC2002", Stage::Reference, "disabled")],
        );
        assert_eq!(run.verdict, Verdict::Pending);
        run.finish();
        assert!(run.passed());
    }

    #[test]
    fn registry_errors_carry_a_remediation() {
        let err = RunError::from(RegistryError::Missing {
            path: PathBuf::from(".storage/core.entity_registry"),
        });
        assert!(err.remediation().contains("--registry"));
        assert!(err.to_string().starts_with("registry unavailable"));
    }
}
