//! Shared helpers for CLI integration tests.

#![allow(unreachable_pub, dead_code)]

use std::path::Path;
use std::process::Command;

use assert_cmd::cargo;
use tempfile::TempDir;

/// The `hacheck` binary, with `HACHECK_CONFIG_DIR` and `RUST_LOG` cleared.
pub fn hacheck_cmd() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("hacheck"));
    cmd.env_remove("HACHECK_CONFIG_DIR").env_remove("RUST_LOG");
    cmd
}

/// Flat registry snapshot shared by the tests.
pub const SNAPSHOT: &str = r#"{"resources": [
  {"id": "light.kitchen", "name": "Kitchen ceiling", "area_id": "kitchen"},
  {"id": "light.attic", "name": "Attic", "enabled": false},
  {"id": "binary_sensor.front_door", "name": "Front door", "device_class": "door", "area_id": "hallway"},
  {"id": "sensor.outdoor_temp", "name": "Outdoor temperature", "device_class": "temperature"},
  {"id": "kitchen", "kind": "area", "name": "Kitchen"},
  {"id": "hallway", "kind": "area", "name": "Hallway"}
]}"#;

/// A configuration directory in a temporary location.
pub struct ConfigTree {
    dir: TempDir,
}

impl ConfigTree {
    /// An empty directory.
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// A directory with the standard registry snapshot and an entry file
    /// including `automations.yaml`.
    pub fn with_automations(automations: &str) -> Self {
        let tree = Self::empty();
        tree.write(".storage/core.entity_registry", SNAPSHOT)
            .write("configuration.yaml", "homeassistant:\n  name: Home\nautomation: !include automations.yaml\n")
            .write("automations.yaml", automations);
        tree
    }

    /// The configuration directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The configuration directory as a command-line argument.
    pub fn arg(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
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
}

/// Automations referencing only known, enabled resources.
pub const CLEAN: &str = "\
- alias: Porch
  triggers:
    - trigger: state
      entity_id: binary_sensor.front_door
  actions:
    - action: light.turn_on
      target:
        entity_id: light.kitchen
        area_id: kitchen
";

/// Automations with one unknown entity on line 4.
pub const BROKEN: &str = "\
- alias: Garage
  triggers:
    - trigger: state
      entity_id: switch.garage_pump
  actions: []
";
