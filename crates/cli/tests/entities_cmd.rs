//! CLI tests for `hacheck entities`.

mod common;

use common::{CLEAN, ConfigTree, hacheck_cmd};

fn entities(tree: &ConfigTree, extra: &[&str]) -> std::process::Output {
    hacheck_cmd()
        .args(["entities", "--config-dir", &tree.arg()])
        .args(extra)
        .output()
        .expect("run entities command")
}

#[test]
fn lists_records_by_domain_then_identifier() {
    let tree = ConfigTree::with_automations(CLEAN);
    let output = entities(&tree, &["--kind", "entity"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids: Vec<&str> = stdout
        .lines()
        .filter_map(|l| l.split_whitespace().next())
        .collect();
    assert_eq!(
        ids,
        ["binary_sensor.front_door", "light.attic", "light.kitchen", "sensor.outdoor_temp"]
    );
    assert!(stdout.contains("light.attic  Attic  (disabled)"), "{stdout}");
}

#[test]
fn filters_combine() {
    let tree = ConfigTree::with_automations(CLEAN);
    let output = entities(&tree, &["--domain", "light", "--area", "kitchen"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "light.kitchen  Kitchen ceiling  area=kitchen\n");
}

#[test]
fn json_output_includes_stats() {
    let tree = ConfigTree::with_automations(CLEAN);
    let output = entities(&tree, &["--device-class", "door", "--json"]);

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(json["stats"]["entities"], 4);
    assert_eq!(json["stats"]["areas"], 2);
    assert_eq!(json["records"][0]["id"], "binary_sensor.front_door");
    assert_eq!(json["records"].as_array().map(Vec::len), Some(1));
}

#[test]
fn query_matches_names() {
    let tree = ConfigTree::with_automations(CLEAN);
    let output = entities(&tree, &["--query", "TEMPERATURE"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("sensor.outdoor_temp"), "{stdout}");
}

#[test]
fn missing_registry_exits_2() {
    let tree = ConfigTree::empty();
    let output = entities(&tree, &[]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("internal error:"), "{stderr}");
}
