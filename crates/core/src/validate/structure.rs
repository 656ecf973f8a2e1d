//! Stage 2: shape checks for automation definitions.
//!
//! The controller refuses an automation without a trigger or an action
//! section and rejects service calls that are not `domain.service`. Those
//! mistakes are visible from the documents alone, so they are reported
//! next to reference resolution rather than left to the optional
//! controller-semantic stage.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use hacheck_diagnostics::{Diagnostic, Stage, codes};
use regex::Regex;

use crate::document::{ConfigDocument, IncludeMode, Node, NodeKind};

static SERVICE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+\.[a-z0-9_]+$").expect("valid service name regex"));

/// Step keys whose value is a nested list of steps.
const NESTED_STEPS: &[&str] = &["sequence", "then", "else", "default", "parallel"];

/// Check every automation defined in `docs`.
pub fn check_automations<'a>(docs: impl IntoIterator<Item = &'a ConfigDocument>) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for doc in docs {
        let mut found = Vec::new();
        for root in &doc.nodes {
            match &doc.origin {
                Some(origin) => {
                    if let Some(key) = origin.key.as_deref() {
                        included(key, origin.mode, root, &mut found);
                    }
                }
                None => top_level(root, &mut found),
            }
        }
        for (index, automation) in found.into_iter().enumerate() {
            check_one(&doc.display, index, automation, &mut out);
        }
    }
    out
}

fn is_automation_key(key: &str) -> bool {
    key == "automation" || key.strip_prefix("automation ").is_some_and(|label| !label.is_empty())
}

fn top_level<'a>(root: &'a Node, found: &mut Vec<&'a Node>) {
    let Some(entries) = root.as_mapping() else { return };
    for entry in entries {
        if is_automation_key(&entry.key) {
            listed(&entry.value, found);
        }
        if entry.key == "homeassistant"
            && let Some(packages) = entry.value.get("packages").and_then(Node::as_mapping)
        {
            for package in packages {
                top_level(&package.value, found);
            }
        }
    }
}

fn included<'a>(key: &str, mode: IncludeMode, root: &'a Node, found: &mut Vec<&'a Node>) {
    match mode {
        IncludeMode::DirNamed if key == "packages" => top_level(root, found),
        _ if !is_automation_key(key) => {}
        IncludeMode::File | IncludeMode::DirMergeList => listed(root, found),
        IncludeMode::DirList => found.push(root),
        IncludeMode::DirNamed | IncludeMode::DirMergeNamed => {
            if let Some(entries) = root.as_mapping() {
                found.extend(entries.iter().map(|e| &e.value));
            }
        }
    }
}

fn listed<'a>(value: &'a Node, found: &mut Vec<&'a Node>) {
    match &value.kind {
        NodeKind::Sequence(items) => found.extend(items),
        NodeKind::Mapping(_) => found.push(value),
        _ => {}
    }
}

fn check_one(file: &str, index: usize, automation: &Node, out: &mut Vec<Diagnostic>) {
    if automation.as_mapping().is_none() {
        return;
    }
    let label = automation
        .get("alias")
        .or_else(|| automation.get("id"))
        .and_then(Node::as_str)
        .map_or_else(|| format!("#{}", index + 1), |name| format!("`{name}`"));

    if automation.get("id").is_none() && automation.get("alias").is_none() {
        out.push(
            Diagnostic::warning(
                codes::UNNAMED_AUTOMATION,
                Stage::Reference,
                format!("automation {label} has neither an `id` nor an `alias`"),
            )
            .at(file, Some(automation.line)),
        );
    }

    // Blueprint instances take their triggers and actions from the blueprint.
    if automation.get("use_blueprint").is_some() {
        return;
    }
    let section = |names: [&str; 2]| names.iter().find_map(|n| automation.get(n));
    let triggers = section(["triggers", "trigger"]);
    let actions = section(["actions", "action"]);
    for (present, part) in [(triggers.is_some(), "trigger"), (actions.is_some(), "action")] {
        if !present {
            out.push(
                Diagnostic::error(
                    codes::MISSING_AUTOMATION_PART,
                    Stage::Reference,
                    format!("automation {label} has no {part} section"),
                )
                .at(file, Some(automation.line))
                .with_context(ctx!("missing" => part)),
            );
        }
    }
    if let Some(actions) = actions {
        steps(file, actions, out);
    }
}

fn steps(file: &str, node: &Node, out: &mut Vec<Diagnostic>) {
    match &node.kind {
        NodeKind::Sequence(items) => {
            for item in items {
                step(file, item, out);
            }
        }
        NodeKind::Mapping(_) => step(file, node, out),
        _ => {}
    }
}

fn step(file: &str, node: &Node, out: &mut Vec<Diagnostic>) {
    let Some(entries) = node.as_mapping() else { return };
    for entry in entries {
        match entry.key.as_str() {
            "action" | "service" => {
                if let Some(d) = malformed_service(file, &entry.key, &entry.value) {
                    out.push(d);
                }
            }
            "choose" => {
                let options: Vec<&Node> = match &entry.value.kind {
                    NodeKind::Sequence(items) => items.iter().collect(),
                    _ => vec![&entry.value],
                };
                for option in options {
                    if let Some(sequence) = option.get("sequence") {
                        steps(file, sequence, out);
                    }
                }
            }
            "repeat" => {
                if let Some(sequence) = entry.value.get("sequence") {
                    steps(file, sequence, out);
                }
            }
            key if NESTED_STEPS.contains(&key) => steps(file, &entry.value, out),
            _ => {}
        }
    }
}

fn malformed_service(file: &str, key: &str, value: &Node) -> Option<Diagnostic> {
    let name = value.as_str()?.trim();
    if name.contains("{{") || name.contains("{%") || SERVICE_NAME.is_match(name) {
        return None;
    }
    Some(
        Diagnostic::error(
            codes::MALFORMED_SERVICE,
            Stage::Reference,
            format!("`{name}` is not a `domain.service` name"),
        )
        .at(file, Some(value.line))
        .with_context(ctx!("key" => key, "service" => name)),
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::document::{IncludeOrigin, parse_bytes};
    use hacheck_diagnostics::Severity;

    fn doc(display: &str, src: &str, origin: Option<IncludeOrigin>) -> ConfigDocument {
        let mut d = parse_bytes(Path::new(display), display, src.as_bytes()).unwrap();
        d.origin = origin;
        d
    }

    fn automations(src: &str) -> ConfigDocument {
        doc(
            "automations.yaml",
            src,
            Some(IncludeOrigin {
                key: Some("automation".into()),
                mode: IncludeMode::File,
            }),
        )
    }

    fn ids(diags: &[Diagnostic]) -> Vec<(&str, Option<usize>)> {
        diags.iter().map(|d| (&*d.id, d.line)).collect()
    }

    #[test]
    fn complete_automations_are_silent() {
        let d = automations(
            "\
- id: '1700000000'
  alias: Porch
  triggers: []
  actions:
    - action: light.turn_on
- alias: Legacy keys
  trigger:
    platform: sun
  action:
    service: light.turn_off
- use_blueprint:
    path: motion_light.yaml
  alias: From blueprint
",
        );
        let diags = check_automations([&d]);
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn missing_sections_are_errors() {
        let d = automations("- alias: Nothing\n  mode: single\n- alias: No actions\n  triggers: []\n");
        let diags = check_automations([&d]);
        assert_eq!(
            ids(&diags),
            [
                (codes::MISSING_AUTOMATION_PART, Some(1)),
                (codes::MISSING_AUTOMATION_PART, Some(1)),
                (codes::MISSING_AUTOMATION_PART, Some(3)),
            ]
        );
        assert_eq!(diags[0].message, "automation `Nothing` has no trigger section");
        assert_eq!(diags[2].message, "automation `No actions` has no action section");
        assert!(diags.iter().all(|d| d.severity == Severity::Error));
    }

    #[test]
    fn unnamed_automation_is_a_warning() {
        let d = automations("- triggers: []\n  actions: []\n- id: only_id\n  triggers: []\n  actions: []\n");
        let diags = check_automations([&d]);
        assert_eq!(ids(&diags), [(codes::UNNAMED_AUTOMATION, Some(1))]);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].message, "automation #1 has neither an `id` nor an `alias`");
    }

    #[test]
    fn malformed_services_inside_nested_steps() {
        let d = automations(
            "\
- alias: Nested
  triggers: []
  actions:
    - action: turn_on_light
    - choose:
        - conditions: []
          sequence:
            - service: Light.Turn_On
      default:
        - action: \"{{ 'light.' ~ verb }}\"
    - if: []
      then:
        - action: notify
    - event: custom
      event_data:
        action: not a service
",
        );
        let diags = check_automations([&d]);
        assert_eq!(
            ids(&diags),
            [
                (codes::MALFORMED_SERVICE, Some(4)),
                (codes::MALFORMED_SERVICE, Some(8)),
                (codes::MALFORMED_SERVICE, Some(13)),
            ]
        );
        assert_eq!(diags[0].message, "`turn_on_light` is not a `domain.service` name");
    }

    #[test]
    fn inline_and_package_automations_are_found() {
        let d = doc(
            "configuration.yaml",
            "\
automation:
  - alias: Inline
    triggers: []
automation extra:
  alias: Split
  actions: []
homeassistant:
  packages:
    garage:
      automation:
        - alias: Packaged
          triggers: []
          actions: []
script:
  bedtime:
    sequence: []
",
            None,
        );
        let diags = check_automations([&d]);
        assert_eq!(
            ids(&diags),
            [
                (codes::MISSING_AUTOMATION_PART, Some(2)),
                (codes::MISSING_AUTOMATION_PART, Some(5)),
            ]
        );
    }

    #[test]
    fn directory_lists_hold_one_automation_per_file() {
        let d = doc(
            "automations/porch.yaml",
            "alias: Porch\ntriggers: []\n",
            Some(IncludeOrigin {
                key: Some("automation".into()),
                mode: IncludeMode::DirList,
            }),
        );
        let other = doc(
            "scripts.yaml",
            "- alias: not an automation\n",
            Some(IncludeOrigin {
                key: Some("script".into()),
                mode: IncludeMode::File,
            }),
        );
        let diags = check_automations([&d, &other]);
        assert_eq!(ids(&diags), [(codes::MISSING_AUTOMATION_PART, Some(1))]);
        assert_eq!(diags[0].file.as_deref(), Some("automations/porch.yaml"));
    }
}
