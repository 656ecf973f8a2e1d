//! Stage 3: the controller-semantic collaborator.
//!
//! The collaborator is an external program (typically the controller's own
//! offline config check) that is run against the configuration directory.
//! Its output is treated as untrusted text: structured JSON when it parses,
//! otherwise a line-oriented listing classified with a fixed pattern table.
//! Everything it reports is normalized into [`Diagnostic`]s here, so that a
//! change in the tool's output format stays contained in this module.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use hacheck_diagnostics::{Diagnostic, Severity, Stage, codes};
use hacheck_registry::{RegistryIndex, ResourceKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Placeholder substituted with the configuration directory in the command.
pub const CONFIG_DIR_PLACEHOLDER: &str = "{config_dir}";

/// How the collaborator is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SemanticConfig {
    /// Program and arguments. `None` skips stage 3.
    pub command: Option<Vec<String>>,
    /// Wall-clock limit for one invocation.
    pub timeout_secs: u64,
    /// Downgrade device-trigger findings that name no device identifier.
    pub downgrade_unattributed_device_findings: bool,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: 60,
            downgrade_unattributed_device_findings: true,
        }
    }
}

/// Failure to obtain any output from the collaborator.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SemanticError {
    /// The configured command has no program.
    #[error("semantic command is empty")]
    EmptyCommand,

    /// The program could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        /// Program name as configured.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The program did not finish in time and was killed.
    #[error("semantic validator did not finish within {secs}s")]
    Timeout {
        /// The configured limit.
        secs: u64,
    },

    /// Waiting on the program or building the runtime failed.
    #[error("semantic validator I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw result of one collaborator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Whether the program exited successfully.
    pub success: bool,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// Run the collaborator once against `config_dir`.
///
/// The process runs on a dedicated current-thread runtime and is killed
/// when the timeout expires.
pub fn invoke(config: &SemanticConfig, config_dir: &Path) -> Result<CollaboratorOutput, SemanticError> {
    let argv: Vec<String> = config
        .command
        .iter()
        .flatten()
        .map(|arg| arg.replace(CONFIG_DIR_PLACEHOLDER, &config_dir.to_string_lossy()))
        .collect();
    let Some((program, args)) = argv.split_first() else {
        return Err(SemanticError::EmptyCommand);
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let limit = Duration::from_secs(config.timeout_secs);

    info!(program = %program, timeout_secs = config.timeout_secs, "invoking semantic validator");
    runtime.block_on(async {
        let child = Command::new(program)
            .args(args)
            .current_dir(config_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SemanticError::Spawn {
                program: program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!(timeout_secs = config.timeout_secs, "semantic validator timed out");
                SemanticError::Timeout {
                    secs: config.timeout_secs,
                }
            })??;

        Ok::<_, SemanticError>(CollaboratorOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    })
}

// ── Findings ─────────────────────────────────────────────────────────────

/// What a collaborator finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    /// An entity the controller does not know.
    EntityNotFound,
    /// A service call to an unknown service.
    ServiceNotFound,
    /// An unknown platform or integration.
    PlatformNotFound,
    /// A required configuration key is absent.
    MissingRequired,
    /// A disabled entity is referenced. Never blocking.
    DisabledEntity,
    /// Structurally invalid configuration for an integration.
    InvalidConfig,
    /// A device trigger, condition or action the controller could not
    /// verify. Frequently raised only because the device is not connected
    /// to the machine doing the check.
    DeviceTrigger,
    /// Anything else.
    Other,
}

impl FindingCategory {
    /// Snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            FindingCategory::EntityNotFound => "entity_not_found",
            FindingCategory::ServiceNotFound => "service_not_found",
            FindingCategory::PlatformNotFound => "platform_not_found",
            FindingCategory::MissingRequired => "missing_required",
            FindingCategory::DisabledEntity => "disabled_entity",
            FindingCategory::InvalidConfig => "invalid_config",
            FindingCategory::DeviceTrigger => "device_trigger",
            FindingCategory::Other => "other",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let all = [
            FindingCategory::EntityNotFound,
            FindingCategory::ServiceNotFound,
            FindingCategory::PlatformNotFound,
            FindingCategory::MissingRequired,
            FindingCategory::DisabledEntity,
            FindingCategory::InvalidConfig,
            FindingCategory::DeviceTrigger,
            FindingCategory::Other,
        ];
        all.into_iter().find(|c| c.as_str() == name)
    }
}

/// One finding reported by the collaborator, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Message as reported, trimmed.
    pub message: String,
    /// Severity as reported or classified.
    pub severity: Severity,
    /// File, relative to the configuration directory when it lies inside it.
    pub file: Option<String>,
    /// 1-indexed line.
    pub line: Option<usize>,
    /// Classified category.
    pub category: FindingCategory,
}

// Ordered: the first matching row wins.
static CATEGORIES: LazyLock<Vec<(FindingCategory, Regex)>> = LazyLock::new(|| {
    let row = |category, pattern: &str| {
        (category, Regex::new(pattern).expect("valid finding pattern"))
    };
    vec![
        row(FindingCategory::DisabledEntity, r"(?i)\bentity\b.*\bis disabled\b"),
        row(
            FindingCategory::DeviceTrigger,
            r"(?i)\bunknown device\b|\bdevice\b.*\bnot found\b|\binvalid device (?:trigger|condition|action)\b|\bdevice_(?:trigger|condition|action)\b",
        ),
        row(FindingCategory::EntityNotFound, r"(?i)\bentity\b.*\b(?:not found|does not exist)\b"),
        row(FindingCategory::ServiceNotFound, r"(?i)\bservice\b.*\bnot found\b|\bunknown service\b"),
        row(
            FindingCategory::PlatformNotFound,
            r"(?i)\b(?:platform|integration)\b.*\bnot found\b|\bunknown integration\b",
        ),
        row(FindingCategory::MissingRequired, r"(?i)\brequired key not provided\b"),
        row(FindingCategory::InvalidConfig, r"(?i)\binvalid config\b"),
    ]
});

static SEE_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(See ([^,()]+), line (\d+)\)").expect("valid location pattern")
});

static COLON_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S+\.ya?ml):(\d+)").expect("valid location pattern"));

static DEVICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-f]{32}\b").expect("valid device id pattern"));

/// Report banners that carry no finding of their own.
const BANNERS: &[&str] = &[
    "testing configuration",
    "failed config",
    "successful config",
    "general errors",
    "incorrect config",
];

fn classify(message: &str) -> FindingCategory {
    CATEGORIES
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map_or(FindingCategory::Other, |(category, _)| *category)
}

fn locate(message: &str, config_dir: &Path) -> (Option<String>, Option<usize>) {
    let caps = SEE_LOCATION
        .captures(message)
        .or_else(|| COLON_LOCATION.captures(message));
    let Some(caps) = caps else {
        return (None, None);
    };
    let file = caps.get(1).map(|m| relative_to(m.as_str().trim(), config_dir));
    let line = caps.get(2).and_then(|m| m.as_str().parse().ok());
    (file, line)
}

fn relative_to(file: &str, config_dir: &Path) -> String {
    match Path::new(file).strip_prefix(config_dir) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => file.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Structured {
    List(Vec<RawFinding>),
    Split {
        #[serde(default)]
        errors: Vec<RawFinding>,
        #[serde(default)]
        warnings: Vec<RawFinding>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFinding {
    Text(String),
    Detailed {
        message: String,
        #[serde(default)]
        severity: Option<String>,
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        line: Option<usize>,
        #[serde(default)]
        category: Option<String>,
    },
}

impl RawFinding {
    fn into_finding(self, default: Severity, config_dir: &Path) -> Finding {
        match self {
            RawFinding::Text(message) => {
                let (file, line) = locate(&message, config_dir);
                Finding {
                    category: classify(&message),
                    message: message.trim().to_string(),
                    severity: default,
                    file,
                    line,
                }
            }
            RawFinding::Detailed {
                message,
                severity,
                file,
                line,
                category,
            } => {
                let severity = match severity.as_deref().map(str::to_ascii_lowercase).as_deref() {
                    Some("warning" | "warn") => Severity::Warning,
                    Some("error") => Severity::Error,
                    _ => default,
                };
                let (found_file, found_line) = locate(&message, config_dir);
                Finding {
                    category: category
                        .as_deref()
                        .and_then(FindingCategory::from_name)
                        .unwrap_or_else(|| classify(&message)),
                    message: message.trim().to_string(),
                    severity,
                    file: file.map(|f| relative_to(&f, config_dir)).or(found_file),
                    line: line.or(found_line),
                }
            }
        }
    }
}

/// Parse collaborator output into findings.
///
/// JSON is tried first; anything else is read line by line. Lines that
/// carry no error or warning keyword are ignored.
pub fn parse_findings(output: &str, config_dir: &Path) -> Vec<Finding> {
    if let Ok(structured) = serde_json::from_str::<Structured>(output.trim()) {
        debug!("semantic output is structured");
        let mut findings = match structured {
            Structured::List(items) => items
                .into_iter()
                .map(|f| f.into_finding(Severity::Error, config_dir))
                .collect(),
            Structured::Split { errors, warnings } => errors
                .into_iter()
                .map(|f| f.into_finding(Severity::Error, config_dir))
                .chain(
                    warnings
                        .into_iter()
                        .map(|f| f.into_finding(Severity::Warning, config_dir)),
                )
                .collect::<Vec<_>>(),
        };
        for f in &mut findings {
            if f.category == FindingCategory::DisabledEntity {
                f.severity = Severity::Warning;
            }
        }
        return findings;
    }

    output
        .lines()
        .filter_map(|line| classify_line(line, config_dir))
        .collect()
}

fn classify_line(line: &str, config_dir: &Path) -> Option<Finding> {
    let message = line.trim().trim_start_matches("- ").trim();
    if message.is_empty() {
        return None;
    }
    let lower = message.to_ascii_lowercase();
    if BANNERS.iter().any(|b| lower.starts_with(b)) {
        return None;
    }

    let category = classify(message);
    let severity = if category == FindingCategory::DisabledEntity || lower.contains("warning") {
        Severity::Warning
    } else if category != FindingCategory::Other
        || ["error", "invalid", "failed", "not found"]
            .iter()
            .any(|k| lower.contains(k))
    {
        Severity::Error
    } else {
        return None;
    };

    let (file, line) = locate(message, config_dir);
    Some(Finding {
        message: message.to_string(),
        severity,
        file,
        line,
        category,
    })
}

// ── Normalization ────────────────────────────────────────────────────────

/// Turn findings into stage-3 diagnostics.
///
/// A device-trigger error is downgraded to a `HAC3002` warning when every
/// device identifier it names is a device record in `registry`. When it
/// names none, `downgrade_unattributed` decides.
pub fn normalize(
    findings: Vec<Finding>,
    registry: &RegistryIndex,
    downgrade_unattributed: bool,
) -> Vec<Diagnostic> {
    findings
        .into_iter()
        .map(|f| {
            let downgrade = f.severity == Severity::Error
                && f.category == FindingCategory::DeviceTrigger
                && device_confirmed(&f.message, registry, downgrade_unattributed);
            let diag = if downgrade {
                Diagnostic::warning(
                    codes::DEVICE_TRIGGER_UNCONFIRMED,
                    Stage::Semantic,
                    format!(
                        "{} (device exists in registry; likely not connected during local validation)",
                        f.message
                    ),
                )
            } else {
                Diagnostic::new(codes::SEMANTIC_FINDING, f.severity, Stage::Semantic, f.message)
            };
            let mut diag = match f.file {
                Some(file) => diag.at(file, f.line),
                None => Diagnostic { line: f.line, ..diag },
            };
            diag.context = Some([("category".to_string(), f.category.as_str().to_string())].into());
            diag
        })
        .collect()
}

fn device_confirmed(message: &str, registry: &RegistryIndex, unattributed: bool) -> bool {
    let ids: Vec<&str> = DEVICE_ID.find_iter(message).map(|m| m.as_str()).collect();
    if ids.is_empty() {
        return unattributed;
    }
    ids.iter().all(|id| {
        registry
            .resolve(id)
            .is_some_and(|r| r.kind == ResourceKind::Device)
    })
}

/// Run stage 3 end to end: invoke, parse, normalize.
///
/// Only diagnostics accepted by `in_scope` are returned. A collaborator that
/// exits non-zero with nothing left to report still yields one generic
/// blocking diagnostic.
///
/// Never fails: a collaborator that cannot be started or does not finish
/// becomes a blocking diagnostic.
pub fn check_semantics(
    config: &SemanticConfig,
    config_dir: &Path,
    registry: &RegistryIndex,
    in_scope: impl Fn(&Diagnostic) -> bool,
) -> Vec<Diagnostic> {
    let output = match invoke(config, config_dir) {
        Ok(output) => output,
        Err(e @ SemanticError::Timeout { .. }) => {
            return vec![Diagnostic::error(codes::SEMANTIC_TIMEOUT, Stage::Semantic, e.to_string())];
        }
        Err(e) => {
            warn!(error = %e, "semantic validator unavailable");
            return vec![Diagnostic::error(
                codes::SEMANTIC_UNAVAILABLE,
                Stage::Semantic,
                format!("semantic validator unavailable: {e}"),
            )];
        }
    };
    debug!(code = ?output.code, stdout = output.stdout.len(), stderr = output.stderr.len(), "semantic validator finished");

    let mut findings = parse_findings(&output.stdout, config_dir);
    if !output.success || findings.is_empty() {
        findings.extend(parse_findings(&output.stderr, config_dir));
    }
    let mut diags = normalize(findings, registry, config.downgrade_unattributed_device_findings);
    let reported = diags.len();
    diags.retain(|d| in_scope(d));
    if diags.len() < reported {
        debug!(dropped = reported - diags.len(), "semantic findings outside the scope dropped");
    }

    if !output.success && diags.is_empty() {
        diags.push(exit_failure(&output, reported));
    }
    diags
}

fn exit_failure(output: &CollaboratorOutput, reported: usize) -> Diagnostic {
    let status = output
        .code
        .map_or_else(|| "a signal".to_string(), |c| format!("status {c}"));
    let what = if reported == 0 {
        "without reporting a finding".to_string()
    } else {
        format!("after reporting {reported} finding(s) outside the validated scope")
    };
    let detail = output
        .stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| format!(": {l}"))
        .unwrap_or_default();
    Diagnostic::error(
        codes::SEMANTIC_FINDING,
        Stage::Semantic,
        format!("semantic validator exited with {status} {what}{detail}"),
    )
}
