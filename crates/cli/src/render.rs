//! Source-annotated diagnostic rendering using ariadne.
//!
//! The report itself always goes to stdout in the layout chosen with
//! `--format`. These helpers add coloured source snippets and a summary
//! line on stderr for interactive use.

use std::path::Path;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use hacheck_core::ValidationRun;
use hacheck_diagnostics::{Diagnostic, Severity};

// ── Severity mapping ────────────────────────────────────────────────────

fn report_kind(severity: Severity) -> ReportKind<'static> {
    match severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Error => Color::Red,
        Severity::Warning => Color::Yellow,
    }
}

// ── Snippets ────────────────────────────────────────────────────────────

/// Render every diagnostic to stderr, with a source snippet when it carries
/// a file and line that can still be read from `config_dir`.
///
/// Diagnostics arrive in report order, so each file is read once.
pub(crate) fn render_snippets(config_dir: &Path, diagnostics: &[Diagnostic]) {
    let config = Config::default().with_compact(false);

    for group in diagnostics.chunk_by(|a, b| a.file == b.file) {
        let source = group[0]
            .file
            .as_deref()
            .and_then(|file| std::fs::read_to_string(config_dir.join(file)).ok().map(|text| (file, text)));

        let Some((file, text)) = source else {
            group.iter().for_each(render_plain);
            continue;
        };

        let starts = line_starts(&text);
        let mut cache = (file, Source::from(text.as_str()));
        for diag in group {
            let Some(span) = diag.line.and_then(|line| line_span(&text, &starts, line)) else {
                render_plain(diag);
                continue;
            };

            let mut builder = Report::build(report_kind(diag.severity), (file, span.clone()))
                .with_code(diag.id.as_ref())
                .with_message(&diag.message)
                .with_config(config);

            builder = builder.with_label(
                Label::new((file, span))
                    .with_message(label_message(diag))
                    .with_color(severity_color(diag.severity)),
            );

            if let Some(note) = context_note(diag) {
                builder = builder.with_note(note);
            }
            if let Some(explanation) = diag.explain() {
                builder = builder.with_help(explanation);
            }

            builder.finish().eprint(&mut cache).ok();
        }
    }
}

/// A diagnostic without a usable location.
fn render_plain(diag: &Diagnostic) {
    match &diag.file {
        Some(file) => eprintln!("{}[{}]: {file}: {}", diag.severity, diag.id, diag.message),
        None => eprintln!("{}[{}]: {}", diag.severity, diag.id, diag.message),
    }
    if let Some(note) = context_note(diag) {
        eprintln!("  = note: {note}");
    }
    if let Some(explanation) = diag.explain() {
        eprintln!("  = help: {explanation}");
    }
}

/// Label text: the closest suggestions when there are any, otherwise the stage.
fn label_message(diag: &Diagnostic) -> String {
    if diag.suggestions.is_empty() {
        format!("{} stage", diag.stage)
    } else {
        format!("did you mean {}?", diag.suggestions.join(", "))
    }
}

fn context_note(diag: &Diagnostic) -> Option<String> {
    let ctx = diag.context.as_ref().filter(|c| !c.is_empty())?;
    Some(
        ctx.iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Character offset of the start of each line.
fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    let mut offset = 0;
    for segment in text.split_inclusive('\n') {
        offset += segment.chars().count();
        starts.push(offset);
    }
    starts
}

/// Character range of 1-indexed `line`, without its line terminator.
fn line_span(text: &str, starts: &[usize], line: usize) -> Option<std::ops::Range<usize>> {
    let segment = text.split_inclusive('\n').nth(line.checked_sub(1)?)?;
    let start = starts[line - 1];
    let len = segment.trim_end_matches(['\n', '\r']).chars().count();
    Some(start..start + len.max(1))
}

// ── Summary line ────────────────────────────────────────────────────────

/// Print a coloured summary line showing error and warning counts.
///
/// Example: `2 errors, 1 warning`
pub(crate) fn print_summary(run: &ValidationRun) {
    use ariadne::Fmt;

    let errors = run.count(Severity::Error);
    let warnings = run.count(Severity::Warning);

    if errors + warnings == 0 {
        eprintln!("{}", "no problems found".fg(Color::Green));
        return;
    }

    let mut parts = Vec::new();
    if errors > 0 {
        let s = if errors == 1 { "" } else { "s" };
        parts.push(format!("{}", format!("{errors} error{s}").fg(Color::Red)));
    }
    if warnings > 0 {
        let s = if warnings == 1 { "" } else { "s" };
        parts.push(format!(
            "{}",
            format!("{warnings} warning{s}").fg(Color::Yellow)
        ));
    }
    eprintln!("{}", parts.join(", "));
}
