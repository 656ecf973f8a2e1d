mod render;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hacheck_core::report::{self, EXIT_INTERNAL, EXIT_PASSED};
use hacheck_core::{ReportFormat, RunError, Scope, Stage, Validator, ValidatorConfig};
use hacheck_diagnostics as diag;
use hacheck_registry::{ResourceKind, ResourceRecord, SearchQuery, load_index};
use tracing::{Level, debug};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::render::{print_summary, render_snippets};

// ── CLI definition ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "hacheck",
    version,
    about = "Validate a home-automation configuration tree before it is deployed"
)]
struct Cli {
    /// Configuration directory holding the entry file and `.storage/`.
    #[arg(long, global = true, env = "HACHECK_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,

    /// Validator configuration file. Defaults to `hacheck.json` in the
    /// configuration directory when that file exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Registry snapshot to use instead of the configured `.storage` files.
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Log more (`-v` info, `-vv` debug). `RUST_LOG` wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the validation pipeline and report diagnostics.
    Validate {
        /// `all` for the whole include closure of the entry file, or one
        /// file (relative to the configuration directory).
        #[arg(long, default_value = "all")]
        scope: String,

        /// Last stage to run. Syntax always runs.
        #[arg(long, value_enum, default_value_t = StageArg::All)]
        stage: StageArg,

        /// Report layout.
        #[arg(long, value_enum, default_value_t = FormatArg::Grouped)]
        format: FormatArg,

        /// Controller-semantic validator command line. `{config_dir}` is
        /// replaced with the configuration directory.
        #[arg(long)]
        semantic_command: Option<String>,

        /// Seconds before the semantic validator is abandoned.
        #[arg(long)]
        semantic_timeout: Option<u64>,

        /// Also print source snippets for located diagnostics to stderr.
        #[arg(long)]
        snippets: bool,
    },

    /// Explain a diagnostic code (e.g. HAC2001).
    Explain {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// List registry records, ordered by domain then identifier.
    Entities {
        /// Exact domain (`light`, `binary_sensor`, ...).
        #[arg(long)]
        domain: Option<String>,
        /// Exact area id.
        #[arg(long)]
        area: Option<String>,
        /// Exact device class.
        #[arg(long)]
        device_class: Option<String>,
        /// Case-insensitive substring of the identifier or name.
        #[arg(long)]
        query: Option<String>,
        /// Record kind.
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageArg {
    Syntax,
    Reference,
    Semantic,
    All,
}

impl From<StageArg> for Stage {
    fn from(s: StageArg) -> Self {
        match s {
            StageArg::Syntax => Stage::Syntax,
            StageArg::Reference => Stage::Reference,
            StageArg::Semantic | StageArg::All => Stage::Semantic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Grouped by file, with stage and verdict summary.
    Grouped,
    /// One `SEVERITY file:line message` per diagnostic.
    Lines,
    /// The serialized run report.
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Grouped => ReportFormat::Grouped,
            FormatArg::Lines => ReportFormat::Lines,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Entity,
    Device,
    Area,
}

impl From<KindArg> for ResourceKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Entity => ResourceKind::Entity,
            KindArg::Device => ResourceKind::Device,
            KindArg::Area => ResourceKind::Area,
        }
    }
}

// ── Main ────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = match &cli.cmd {
        Cmd::Validate { format, .. } => *format == FormatArg::Json,
        Cmd::Explain { json, .. } | Cmd::Entities { json, .. } => *json,
    };

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            report_internal(&err, json);
            EXIT_INTERNAL
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.cmd {
        Cmd::Validate {
            ref scope,
            stage,
            format,
            ref semantic_command,
            semantic_timeout,
            snippets,
        } => {
            let mut config = load_config(&cli)?;
            if let Some(command) = semantic_command {
                config.semantic.command = Some(command.split_whitespace().map(str::to_string).collect());
            }
            if let Some(secs) = semantic_timeout {
                config.semantic.timeout_secs = secs;
            }
            config.validate().map_err(RunError::from)?;
            cmd_validate(config, &Scope::parse(scope), stage.into(), format.into(), snippets)
        }
        Cmd::Explain { ref id, json } => cmd_explain(id, json),
        Cmd::Entities {
            ref domain,
            ref area,
            ref device_class,
            ref query,
            kind,
            json,
        } => {
            let config = load_config(&cli)?;
            let query = SearchQuery {
                domain: domain.clone(),
                area_id: area.clone(),
                device_class: device_class.clone(),
                text: query.clone(),
                kind: kind.map(Into::into),
            };
            cmd_entities(&config, &query, json)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

/// Configuration file values with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<ValidatorConfig> {
    let mut config =
        ValidatorConfig::load(&cli.config_dir, cli.config.as_deref()).map_err(RunError::from)?;
    if let Some(path) = &cli.registry {
        let path = std::path::absolute(path)
            .with_context(|| format!("failed to resolve registry path {}", path.display()))?;
        config.registry.entities = path;
        config.registry.devices = None;
        config.registry.areas = None;
    }
    debug!(config_dir = %config.config_dir.display(), "configuration loaded");
    Ok(config)
}

// ── Commands ────────────────────────────────────────────────────────────

fn cmd_validate(
    config: ValidatorConfig,
    scope: &Scope,
    until: Stage,
    format: ReportFormat,
    snippets: bool,
) -> Result<i32> {
    let mut validator = Validator::new(config);
    let run = validator.validate(scope, until)?;
    let rendered = report::render(&run, format);
    print!("{}", rendered.text);

    if snippets {
        render_snippets(&validator.config().config_dir, &run.diagnostics);
        print_summary(&run);
    }
    Ok(rendered.exit_code)
}

fn cmd_explain(id: &str, json: bool) -> Result<i32> {
    if json {
        let out = serde_json::json!({
            "id": id,
            "explanation": diag::explain(id),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if let Some(text) = diag::explain(id) {
        use ariadne::Fmt;
        println!("{}: {}", id.fg(ariadne::Color::Cyan), text);
    } else {
        println!("{id}: (no explanation available)");
    }
    Ok(EXIT_PASSED)
}

fn cmd_entities(config: &ValidatorConfig, query: &SearchQuery, json: bool) -> Result<i32> {
    let index = load_index(&config.snapshot_sources()).map_err(RunError::from)?;
    let hits = index.search(|r| query.matches(r));

    if json {
        let out = serde_json::json!({
            "stats": index.stats(),
            "records": hits,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for record in &hits {
            println!("{}", entity_line(record));
        }
        eprintln!("{} of {} records", hits.len(), index.len());
    }
    Ok(EXIT_PASSED)
}

fn entity_line(record: &ResourceRecord) -> String {
    let mut line = record.id.clone();
    if let Some(name) = &record.name {
        line.push_str(&format!("  {name}"));
    }
    if let Some(area) = &record.area_id {
        line.push_str(&format!("  area={area}"));
    }
    if let Some(class) = &record.device_class {
        line.push_str(&format!("  class={class}"));
    }
    if !record.enabled {
        line.push_str("  (disabled)");
    }
    line
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Report a failure that stopped the command before it produced a result.
///
/// In JSON mode the envelope goes to stdout so callers parsing stdout
/// still get one document.
fn report_internal(err: &anyhow::Error, json: bool) {
    let run_error = err.downcast_ref::<RunError>();
    let kind = match run_error {
        Some(RunError::Registry(_)) => "registry_unavailable",
        Some(RunError::Config(_)) => "invalid_config",
        _ => "command_failed",
    };
    let hint = run_error.map(RunError::remediation);

    if json {
        let out = serde_json::json!({
            "success": false,
            "error": kind,
            "message": format!("{err:#}"),
            "hint": hint,
        });
        match serde_json::to_string_pretty(&out) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("internal error: {err:#}"),
        }
        return;
    }

    eprintln!("internal error: {err:#}");
    if let Some(hint) = hint {
        eprintln!("hint: {hint}");
    }
}

