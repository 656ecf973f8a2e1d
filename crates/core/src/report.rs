//! Rendering a [`ValidationRun`] for people and for hooks.
//!
//! All renderings are pure functions of the run, so identical runs render
//! byte-identically.

use std::cmp::Ordering;
use std::fmt::Write as _;

use hacheck_diagnostics::{Diagnostic, Severity};

use crate::validate::{StageStatus, ValidationRun, Verdict};

/// Exit code of a passed run.
pub const EXIT_PASSED: i32 = 0;
/// Exit code of a failed run.
pub const EXIT_FAILED: i32 = 1;
/// Exit code of a run that could not start.
pub const EXIT_INTERNAL: i32 = 2;

/// Label used for diagnostics that are not tied to a file.
const NO_FILE: &str = "(no file)";

/// Output layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Grouped by file, then line, with a stage and verdict summary.
    #[default]
    Grouped,
    /// One `SEVERITY file:line message` line per diagnostic.
    Lines,
    /// The serialized run.
    Json,
}

/// A rendered report and the process exit code it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    /// Text for standard output.
    pub text: String,
    /// 0 when the run passed, 1 when it failed.
    pub exit_code: i32,
}

/// Report order: by file (file-less diagnostics last), then by line
/// (line-less first within a file), then by stage. Stable, so producers'
/// relative order survives for equal keys.
pub fn report_order(a: &Diagnostic, b: &Diagnostic) -> Ordering {
    let file = match (&a.file, &b.file) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    file.then_with(|| a.line.cmp(&b.line))
        .then_with(|| a.stage.cmp(&b.stage))
}

/// Sort `diags` into report order.
pub fn sort_diagnostics(diags: &mut [Diagnostic]) {
    diags.sort_by(report_order);
}

/// Render `run` in `format`.
pub fn render(run: &ValidationRun, format: ReportFormat) -> RenderedReport {
    let text = match format {
        ReportFormat::Grouped => render_grouped(run),
        ReportFormat::Lines => render_lines(run),
        ReportFormat::Json => render_json(run),
    };
    RenderedReport {
        text,
        exit_code: exit_code(run),
    }
}

/// Exit code for a completed run.
pub fn exit_code(run: &ValidationRun) -> i32 {
    match run.verdict {
        Verdict::Passed => EXIT_PASSED,
        Verdict::Failed | Verdict::Pending => EXIT_FAILED,
    }
}

/// The human-readable layout:
///
/// ```text
/// automations.yaml
///   12: error[HAC2001] reference: entity `binary_sensor.missing_x` not found in registry
///
/// stages: syntax passed, reference failed (1 error), semantic skipped
/// verdict: failed (1 error, 0 warnings) [scope: all]
/// ```
pub fn render_grouped(run: &ValidationRun) -> String {
    let mut out = String::new();
    let mut current: Option<Option<&str>> = None;
    for d in &run.diagnostics {
        let file = d.file.as_deref();
        if current != Some(file) {
            let _ = writeln!(out, "{}", file.unwrap_or(NO_FILE));
            current = Some(file);
        }
        let line = d.line.map_or_else(|| "-".to_string(), |l| l.to_string());
        let _ = writeln!(out, "  {line}: {}[{}] {}: {}", d.severity, d.id, d.stage, d.message);
    }
    if !run.diagnostics.is_empty() {
        out.push('\n');
    }

    let stages: Vec<String> = run
        .stages
        .iter()
        .map(|s| {
            let status = match s.status {
                StageStatus::Passed => "passed",
                StageStatus::Failed => "failed",
                StageStatus::Skipped => return format!("{} skipped", s.stage),
            };
            let mut counts = Vec::new();
            if s.errors > 0 {
                counts.push(plural(s.errors, "error"));
            }
            if s.warnings > 0 {
                counts.push(plural(s.warnings, "warning"));
            }
            if counts.is_empty() {
                format!("{} {status}", s.stage)
            } else {
                format!("{} {status} ({})", s.stage, counts.join(", "))
            }
        })
        .collect();
    let _ = writeln!(out, "stages: {}", stages.join(", "));

    let verdict = match run.verdict {
        Verdict::Passed => "passed",
        Verdict::Failed => "failed",
        Verdict::Pending => "pending",
    };
    let _ = writeln!(
        out,
        "verdict: {verdict} ({}, {}) [scope: {}]",
        plural(run.count(Severity::Error), "error"),
        plural(run.count(Severity::Warning), "warning"),
        run.scope
    );
    out
}

/// The hook layout: `ERROR file:line message`, one per diagnostic.
pub fn render_lines(run: &ValidationRun) -> String {
    let mut out = String::new();
    for d in &run.diagnostics {
        let severity = match d.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        let location = match (&d.file, d.line) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.clone(),
            (None, _) => "-".to_string(),
        };
        let _ = writeln!(out, "{severity} {location} {}", d.message);
    }
    out
}

/// The serialized run, pretty-printed.
pub fn render_json(run: &ValidationRun) -> String {
    let mut text = serde_json::to_string_pretty(run).unwrap_or_else(|e| {
        serde_json::json!({ "error": format!("failed to serialize report: {e}") }).to_string()
    });
    text.push('\n');
    text
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
