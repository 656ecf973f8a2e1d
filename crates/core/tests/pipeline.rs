//! End-to-end pipeline runs over temporary configuration trees.

mod common;

use std::sync::Arc;

use common::{DEVICE_ID, Fixture, codes, find_diag};
use hacheck_core::report::{ReportFormat, render};
use hacheck_core::{
    RunError, Scope, Severity, Stage, StageStatus, Validator, Verdict, codes as diag_codes,
};

const CONFIGURATION: &str = "\
homeassistant:
  name: Home
automation: !include automations.yaml
script: !include scripts.yaml
input_boolean:
  guest_mode:
    name: Guest mode
";

fn tree(automations: &str) -> Fixture {
    let fx = Fixture::with_registry();
    fx.write("configuration.yaml", CONFIGURATION)
        .write("automations.yaml", automations)
        .write("scripts.yaml", "bedtime:\n  sequence:\n    - action: light.turn_off\n      target:\n        entity_id: light.living_room\n");
    fx
}

fn statuses(run: &hacheck_core::ValidationRun) -> Vec<(Stage, StageStatus)> {
    run.stages.iter().map(|s| (s.stage, s.status)).collect()
}

// ─── Stage 2 ─────────────────────────────────────────────────────────────────

#[test]
fn known_enabled_references_produce_nothing() {
    let fx = tree(
        "\
- alias: Kitchen
  triggers:
    - trigger: state
      entity_id: binary_sensor.motion_hall
  conditions:
    - condition: template
      value_template: \"{{ is_state('input_boolean.guest_mode', 'off') and is_state('sun.sun', 'below_horizon') }}\"
  actions:
    - action: script.bedtime
    - action: light.turn_on
      target:
        entity_id: light.kitchen
        area_id: kitchen
        device_id: 8f14e45fceea167a5a36dedd4bea2543
",
    );
    let run = fx.run();
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert_eq!(run.verdict, Verdict::Passed);
    assert_eq!(
        statuses(&run),
        [
            (Stage::Syntax, StageStatus::Passed),
            (Stage::Reference, StageStatus::Passed),
            (Stage::Semantic, StageStatus::Skipped),
        ]
    );
}

#[test]
fn missing_trigger_entity_is_one_error_with_suggestions() {
    let fx = tree(
        "\
- alias: Door
  triggers:
    - trigger: state
      entity_id: binary_sensor.missing_x
  actions: []
",
    );
    let run = fx.run();
    assert_eq!(codes(&run), [diag_codes::UNRESOLVED_IDENTIFIER]);
    let d = &run.diagnostics[0];
    assert_eq!(d.severity, Severity::Error);
    assert_eq!(d.stage, Stage::Reference);
    assert_eq!(d.file.as_deref(), Some("automations.yaml"));
    assert_eq!(d.line, Some(4));
    assert!(d.message.contains("binary_sensor.missing_x"), "{}", d.message);
    assert_eq!(d.suggestions, ["binary_sensor.missing_y", "binary_sensor.missing_z"]);
    assert_eq!(run.verdict, Verdict::Failed);
}

#[test]
fn disabled_reference_alone_passes() {
    let fx = tree(
        "\
- alias: Attic
  triggers:
    - trigger: time
      at: '07:00'
  actions:
    - action: light.turn_on
      entity_id: light.attic
",
    );
    let run = fx.run();
    assert_eq!(codes(&run), [diag_codes::DISABLED_IDENTIFIER]);
    assert_eq!(run.diagnostics[0].severity, Severity::Warning);
    assert_eq!(run.verdict, Verdict::Passed);
    assert_eq!(render(&run, ReportFormat::Grouped).exit_code, 0);
}

#[test]
fn secret_and_input_tags_are_never_resolved() {
    let fx = tree(
        "\
- alias: Tagged
  triggers:
    - trigger: state
      entity_id: !secret hidden_sensor
  actions:
    - action: light.turn_on
      entity_id: !input target_light
",
    );
    let run = fx.run();
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
}

#[test]
fn the_secrets_file_is_not_scanned() {
    let fx = Fixture::with_registry();
    fx.write("configuration.yaml", "notify_target: !include secrets.yaml\n")
        .write("secrets.yaml", "entity_id: light.does_not_exist\n");
    let run = fx.run();
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
}

#[test]
fn wrong_kind_is_unresolved() {
    let fx = tree(
        "\
- alias: Area as device
  triggers: []
  actions:
    - action: light.turn_on
      target:
        device_id: kitchen
",
    );
    let run = fx.run();
    let found = find_diag(&run, diag_codes::UNRESOLVED_IDENTIFIER);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message, "`kitchen` is an area, not a device");
}

// ─── Stage 1 ─────────────────────────────────────────────────────────────────

#[test]
fn syntax_errors_do_not_stop_reference_checks() {
    let fx = Fixture::with_registry();
    fx.write(
        "configuration.yaml",
        "automation: !include automations.yaml\nscript: !include scripts.yaml\n",
    )
    .write("automations.yaml", "- alias: Broken\n  triggers: [\n    entity_id: light.kitchen\n")
    .write("scripts.yaml", "wake:\n  sequence:\n    - action: light.turn_on\n      entity_id: light.bedroom\n");

    let run = fx.run();
    assert_eq!(
        codes(&run),
        [diag_codes::INVALID_SYNTAX, diag_codes::UNRESOLVED_IDENTIFIER]
    );
    let syntax = &run.diagnostics[0];
    assert_eq!(syntax.file.as_deref(), Some("automations.yaml"));
    assert_eq!(syntax.line, Some(2));
    assert_eq!(run.diagnostics[1].file.as_deref(), Some("scripts.yaml"));
    assert_eq!(run.diagnostics[1].line, Some(4));
    assert_eq!(run.verdict, Verdict::Failed);
    assert_eq!(
        statuses(&run)[..2],
        [
            (Stage::Syntax, StageStatus::Failed),
            (Stage::Reference, StageStatus::Failed),
        ]
    );
}

#[test]
fn broken_entry_file_still_checks_what_it_includes() {
    let fx = Fixture::with_registry();
    fx.write(
        "configuration.yaml",
        "automation: !include automations.yaml\nbroken: [\n",
    )
    .write(
        "automations.yaml",
        "- alias: Door\n  triggers:\n    - trigger: state\n      entity_id: binary_sensor.missing_x\n  actions: []\n",
    );

    let run = fx.run();
    assert_eq!(
        codes(&run),
        [diag_codes::UNRESOLVED_IDENTIFIER, diag_codes::INVALID_SYNTAX]
    );
    assert_eq!(run.diagnostics[0].file.as_deref(), Some("automations.yaml"));
    assert_eq!(run.diagnostics[0].line, Some(4));
    assert_eq!(run.diagnostics[1].file.as_deref(), Some("configuration.yaml"));
    assert_eq!(
        statuses(&run)[..2],
        [
            (Stage::Syntax, StageStatus::Failed),
            (Stage::Reference, StageStatus::Failed),
        ]
    );
}

#[test]
fn until_syntax_skips_later_stages() {
    let fx = tree("- entity_id: light.nowhere\n");
    let run = fx.run_with(fx.config(), &Scope::All, Stage::Syntax);
    assert!(run.diagnostics.is_empty());
    assert!(run.passed());
    assert_eq!(
        statuses(&run),
        [
            (Stage::Syntax, StageStatus::Passed),
            (Stage::Reference, StageStatus::Skipped),
            (Stage::Semantic, StageStatus::Skipped),
        ]
    );
}

// ─── Run-level behavior ──────────────────────────────────────────────────────

#[test]
fn missing_registry_aborts_before_any_stage() {
    let fx = Fixture::new();
    fx.write("configuration.yaml", "automation: !include missing.yaml\n");
    let err = Validator::new(fx.config())
        .validate(&Scope::All, Stage::Semantic)
        .unwrap_err();
    assert!(matches!(err, RunError::Registry(_)), "{err}");
}

#[test]
fn identical_inputs_render_identically() {
    let fx = tree(
        "\
- alias: Many
  triggers:
    - trigger: state
      entity_id: binary_sensor.missing_x, light.attic
  actions:
    - action: light.turn_on
      entity_id: light.kitchn
",
    );
    let mut validator = Validator::new(fx.config());
    let first = validator.validate(&Scope::All, Stage::Semantic).unwrap();
    let second = validator.validate(&Scope::All, Stage::Semantic).unwrap();
    for format in [ReportFormat::Grouped, ReportFormat::Lines, ReportFormat::Json] {
        assert_eq!(render(&first, format), render(&second, format));
    }
    assert_eq!(first.diagnostics.len(), 3);
}

#[test]
fn session_reuses_the_registry_index() {
    let fx = tree("[]\n");
    let mut validator = Validator::new(fx.config());
    let a = validator.registry().unwrap();
    let b = validator.registry().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn file_scope_still_sees_declarations_elsewhere() {
    let fx = tree(
        "\
- alias: Bed
  triggers: []
  actions:
    - action: script.turn_on
      entity_id: script.bedtime
    - condition: state
      entity_id: input_boolean.guest_mode
      state: 'off'
    - action: light.turn_on
      entity_id: light.nope
",
    );
    let run = fx.run_with(fx.config(), &Scope::parse("automations.yaml"), Stage::Semantic);
    assert_eq!(run.scope, "automations.yaml");
    assert_eq!(codes(&run), [diag_codes::UNRESOLVED_IDENTIFIER]);
    assert!(run.diagnostics[0].message.contains("light.nope"));
}

#[test]
fn automation_shape_is_checked_without_a_collaborator() {
    let fx = tree(
        "\
- alias: No trigger
  actions:
    - action: light.turn_on
      entity_id: light.kitchen
- triggers: []
  actions:
    - service: lightturn_on
",
    );
    let run = fx.run();
    assert_eq!(
        codes(&run),
        [
            diag_codes::MISSING_AUTOMATION_PART,
            diag_codes::UNNAMED_AUTOMATION,
            diag_codes::MALFORMED_SERVICE,
        ]
    );
    let lines: Vec<_> = run.diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, [Some(1), Some(5), Some(7)]);
    assert_eq!(run.verdict, Verdict::Failed);
    assert_eq!(run.stages[2].status, StageStatus::Skipped);
}

// ─── Stage 3 ─────────────────────────────────────────────────────────────────

#[cfg(unix)]
mod semantic {
    use super::*;

    fn with_command(fx: &Fixture, script: &str, timeout_secs: u64) -> hacheck_core::ValidationRun {
        let mut config = fx.config();
        config.semantic.command = Some(vec!["sh".into(), "-c".into(), script.into()]);
        config.semantic.timeout_secs = timeout_secs;
        fx.run_with(config, &Scope::All, Stage::Semantic)
    }

    #[test]
    fn findings_are_normalized_with_locations() {
        let fx = tree("[]\n");
        let run = with_command(
            &fx,
            "echo 'Testing configuration at {config_dir}'; \
             echo 'Invalid config for [light]: required key not provided (See {config_dir}/configuration.yaml, line 2).'; \
             exit 1",
            30,
        );
        assert_eq!(codes(&run), [diag_codes::SEMANTIC_FINDING]);
        let d = &run.diagnostics[0];
        assert_eq!(d.stage, Stage::Semantic);
        assert_eq!(d.file.as_deref(), Some("configuration.yaml"));
        assert_eq!(d.line, Some(2));
        assert_eq!(run.stages[2].status, StageStatus::Failed);
    }

    #[test]
    fn confirmed_device_trigger_is_only_a_warning() {
        let fx = tree("[]\n");
        let script = format!("echo \"Unknown device '{DEVICE_ID}' (See {{config_dir}}/automations.yaml, line 1)\"; exit 1");
        let run = with_command(&fx, &script, 30);
        assert_eq!(codes(&run), [diag_codes::DEVICE_TRIGGER_UNCONFIRMED]);
        assert_eq!(run.diagnostics[0].severity, Severity::Warning);
        assert_eq!(run.verdict, Verdict::Passed);
    }

    #[test]
    fn silent_failure_is_still_an_error() {
        let fx = tree("[]\n");
        let run = with_command(&fx, "echo 'boom' >&2; exit 3", 30);
        assert_eq!(codes(&run), [diag_codes::SEMANTIC_FINDING]);
        assert!(run.diagnostics[0].message.contains("status 3"));
        assert!(run.diagnostics[0].message.ends_with(": boom"));
    }

    #[test]
    fn clean_collaborator_passes() {
        let fx = tree("[]\n");
        let run = with_command(&fx, "echo 'Configuration valid'", 30);
        assert!(run.passed(), "{:#?}", run.diagnostics);
        assert_eq!(run.stages[2].status, StageStatus::Passed);
    }

    #[test]
    fn timeout_is_a_distinct_blocking_error() {
        let fx = tree("[]\n");
        let started = std::time::Instant::now();
        let run = with_command(&fx, "sleep 10", 1);
        assert!(started.elapsed() < std::time::Duration::from_secs(8));
        assert_eq!(codes(&run), [diag_codes::SEMANTIC_TIMEOUT]);
        assert_eq!(run.verdict, Verdict::Failed);
    }

    fn scoped_package(fx: &Fixture, script: &str) -> hacheck_core::ValidationRun {
        fx.write("configuration.yaml", "homeassistant:\n  packages: !include_dir_named pkg\n")
            .write("pkg/main.yaml", "script: !include sub.yaml\n")
            .write("pkg/sub.yaml", "wake:\n  sequence: []\n")
            .write("other.yaml", "{}\n");
        let mut config = fx.config();
        config.semantic.command = Some(vec!["sh".into(), "-c".into(), script.into()]);
        fx.run_with(config, &Scope::parse("pkg/main.yaml"), Stage::Semantic)
    }

    #[test]
    fn file_scope_keeps_findings_in_included_files() {
        let fx = Fixture::with_registry();
        let run = scoped_package(
            &fx,
            "echo 'Invalid config for [script]: bad (See {config_dir}/pkg/sub.yaml, line 1)'; exit 1",
        );
        assert_eq!(run.scope, "pkg/main.yaml");
        assert_eq!(codes(&run), [diag_codes::SEMANTIC_FINDING]);
        assert_eq!(run.diagnostics[0].file.as_deref(), Some("pkg/sub.yaml"));
        assert_eq!(run.diagnostics[0].line, Some(1));
        assert_eq!(run.verdict, Verdict::Failed);
    }

    #[test]
    fn file_scope_failure_outside_the_closure_still_fails() {
        let fx = Fixture::with_registry();
        let run = scoped_package(
            &fx,
            "echo 'Invalid config for [group]: bad (See {config_dir}/other.yaml, line 1)'; exit 1",
        );
        assert_eq!(codes(&run), [diag_codes::SEMANTIC_FINDING]);
        assert_eq!(run.diagnostics[0].file, None);
        assert!(run.diagnostics[0].message.contains("status 1"), "{}", run.diagnostics[0].message);
        assert_eq!(run.verdict, Verdict::Failed);
    }

    #[test]
    fn missing_program_is_unavailable() {
        let fx = tree("[]\n");
        let mut config = fx.config();
        config.semantic.command = Some(vec!["/nonexistent/hacheck-collaborator".into()]);
        let run = fx.run_with(config, &Scope::All, Stage::Semantic);
        assert_eq!(codes(&run), [diag_codes::SEMANTIC_UNAVAILABLE]);
    }
}
