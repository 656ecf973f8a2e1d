//! Shared test helpers for `hacheck_core` integration tests.

#![allow(unreachable_pub)]

use std::path::Path;

use hacheck_core::{Diagnostic, Scope, Stage, ValidationRun, Validator, ValidatorConfig};
use serde_json::{Value, json};
use tempfile::TempDir;

/// A configuration directory in a temporary location.
pub struct Fixture {
    dir: TempDir,
}

#[allow(dead_code)]
impl Fixture {
    /// An empty configuration directory.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// A directory with the standard registry snapshots already written.
    pub fn with_registry() -> Self {
        let fx = Self::new();
        fx.write_registry();
        fx
    }

    /// The configuration directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> &Self {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, contents).expect("write fixture file");
        self
    }

    /// Write the controller-native entity, device and area registries.
    pub fn write_registry(&self) -> &Self {
        let entities: Vec<Value> = ENTITIES
            .iter()
            .map(|(id, disabled)| {
                json!({
                    "entity_id": id,
                    "original_name": id.split('.').nth(1),
                    "disabled_by": if *disabled { Some("user") } else { None },
                    "device_id": if id.starts_with("binary_sensor.front") { Some(DEVICE_ID) } else { None },
                })
            })
            .collect();
        self.write(
            ".storage/core.entity_registry",
            &storage_envelope("entities", entities),
        );
        self.write(
            ".storage/core.device_registry",
            &storage_envelope(
                "devices",
                vec![json!({"id": DEVICE_ID, "name": "Front door sensor", "area_id": "hallway", "disabled_by": null})],
            ),
        );
        self.write(
            ".storage/core.area_registry",
            &storage_envelope(
                "areas",
                vec![json!({"id": "hallway", "name": "Hallway"}), json!({"id": "kitchen", "name": "Kitchen"})],
            ),
        );
        self
    }

    /// Defaults for this directory.
    pub fn config(&self) -> ValidatorConfig {
        ValidatorConfig::for_dir(self.path())
    }

    /// Run every stage over the whole tree.
    pub fn run(&self) -> ValidationRun {
        self.run_with(self.config(), &Scope::All, Stage::Semantic)
    }

    /// Run with explicit configuration, scope and last stage.
    pub fn run_with(&self, config: ValidatorConfig, scope: &Scope, until: Stage) -> ValidationRun {
        Validator::new(config)
            .validate(scope, until)
            .expect("registry should be available")
    }
}

/// Device identifier of the front door sensor in the standard registry.
pub const DEVICE_ID: &str = "8f14e45fceea167a5a36dedd4bea2543";

/// Standard entity registry: (identifier, disabled).
pub const ENTITIES: &[(&str, bool)] = &[
    ("binary_sensor.front_door", false),
    ("binary_sensor.missing_y", false),
    ("binary_sensor.missing_z", false),
    ("binary_sensor.motion_hall", false),
    ("light.attic", true),
    ("light.kitchen", false),
    ("light.living_room", false),
    ("sensor.outdoor_temp", false),
];

fn storage_envelope(key: &str, items: Vec<Value>) -> String {
    json!({
        "version": 1,
        "minor_version": 1,
        "data": { key: items },
    })
    .to_string()
}

/// Diagnostics with the given code.
#[allow(dead_code)]
pub fn find_diag<'a>(run: &'a ValidationRun, id: &str) -> Vec<&'a Diagnostic> {
    run.diagnostics.iter().filter(|d| d.id == id).collect()
}

/// Codes of every diagnostic, in report order.
#[allow(dead_code)]
pub fn codes(run: &ValidationRun) -> Vec<String> {
    run.diagnostics.iter().map(|d| d.id.to_string()).collect()
}
