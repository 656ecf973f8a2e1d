//! On-disk snapshot formats.
//!
//! Two shapes are accepted:
//!
//! - the controller's own storage envelope, `{"data": {"entities": [...]}}`
//!   (likewise `devices` and `areas`), exactly as the controller writes it;
//! - a flat snapshot, `{"resources": [...]}` or a bare array, with one
//!   normalized record per resource.

use serde::Deserialize;

use crate::{ResourceKind, ResourceRecord};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SnapshotFile {
    Storage { data: StorageData },
    Flat { resources: Vec<FlatRecord> },
    Bare(Vec<FlatRecord>),
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StorageData {
    #[serde(default)]
    entities: Vec<StorageEntity>,
    #[serde(default)]
    devices: Vec<StorageDevice>,
    #[serde(default)]
    areas: Vec<StorageArea>,
}

#[derive(Debug, Deserialize)]
struct StorageEntity {
    entity_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default)]
    area_id: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    disabled_by: Option<String>,
    #[serde(default)]
    device_class: Option<String>,
    #[serde(default)]
    original_device_class: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StorageDevice {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    name_by_user: Option<String>,
    #[serde(default)]
    area_id: Option<String>,
    #[serde(default)]
    disabled_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StorageArea {
    #[serde(alias = "area_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FlatRecord {
    id: String,
    #[serde(default)]
    kind: ResourceKind,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    area_id: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default = "enabled_default")]
    enabled: bool,
    #[serde(default)]
    device_class: Option<String>,
}

fn enabled_default() -> bool {
    true
}

impl SnapshotFile {
    /// Flatten the file into normalized records, in file order.
    pub(crate) fn into_records(self) -> Vec<ResourceRecord> {
        match self {
            SnapshotFile::Storage { data } => {
                let mut out =
                    Vec::with_capacity(data.entities.len() + data.devices.len() + data.areas.len());
                out.extend(data.entities.into_iter().map(entity_record));
                out.extend(data.devices.into_iter().map(device_record));
                out.extend(data.areas.into_iter().map(area_record));
                out
            }
            SnapshotFile::Flat { resources } | SnapshotFile::Bare(resources) => {
                resources.into_iter().map(flat_record).collect()
            }
        }
    }
}

fn entity_record(e: StorageEntity) -> ResourceRecord {
    ResourceRecord {
        domain: entity_domain(&e.entity_id).to_string(),
        name: e.name.or(e.original_name),
        kind: ResourceKind::Entity,
        area_id: e.area_id,
        device_id: e.device_id,
        enabled: e.disabled_by.is_none(),
        device_class: e.device_class.or(e.original_device_class),
        id: e.entity_id,
    }
}

fn device_record(d: StorageDevice) -> ResourceRecord {
    ResourceRecord {
        id: d.id,
        name: d.name_by_user.or(d.name),
        domain: ResourceKind::Device.as_str().to_string(),
        kind: ResourceKind::Device,
        area_id: d.area_id,
        device_id: None,
        enabled: d.disabled_by.is_none(),
        device_class: None,
    }
}

fn area_record(a: StorageArea) -> ResourceRecord {
    ResourceRecord {
        id: a.id,
        name: a.name,
        domain: ResourceKind::Area.as_str().to_string(),
        kind: ResourceKind::Area,
        area_id: None,
        device_id: None,
        enabled: true,
        device_class: None,
    }
}

fn flat_record(r: FlatRecord) -> ResourceRecord {
    let domain = r.domain.unwrap_or_else(|| match r.kind {
        ResourceKind::Entity => entity_domain(&r.id).to_string(),
        other => other.as_str().to_string(),
    });
    ResourceRecord {
        id: r.id,
        name: r.name,
        domain,
        kind: r.kind,
        area_id: r.area_id,
        device_id: r.device_id,
        enabled: r.enabled,
        device_class: r.device_class,
    }
}

/// The domain part of an entity identifier (`light` in `light.kitchen`).
///
/// Identifiers without a dot are returned whole; the index rejects them.
pub fn entity_domain(id: &str) -> &str {
    id.split_once('.').map_or(id, |(domain, _)| domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<ResourceRecord> {
        serde_json::from_str::<SnapshotFile>(json)
            .unwrap()
            .into_records()
    }

    #[test]
    fn storage_entity_fields_fall_back() {
        let recs = parse(
            r#"{"version": 1, "data": {"entities": [
                {"entity_id": "binary_sensor.door", "name": null, "original_name": "Front door",
                 "disabled_by": "user", "device_class": null, "original_device_class": "door",
                 "platform": "zha"}
            ]}}"#,
        );
        assert_eq!(recs.len(), 1);
        let r = &recs[0];
        assert_eq!(r.domain, "binary_sensor");
        assert_eq!(r.name.as_deref(), Some("Front door"));
        assert!(!r.enabled);
        assert_eq!(r.device_class.as_deref(), Some("door"));
    }

    #[test]
    fn storage_devices_and_areas() {
        let recs = parse(
            r#"{"data": {
                "devices": [{"id": "abc123", "name": "Hue bridge", "name_by_user": "Bridge", "area_id": "hall", "disabled_by": null}],
                "areas": [{"area_id": "hall", "name": "Hallway"}]
            }}"#,
        );
        assert_eq!(recs[0].kind, ResourceKind::Device);
        assert_eq!(recs[0].name.as_deref(), Some("Bridge"));
        assert_eq!(recs[0].domain, "device");
        assert_eq!(recs[1].kind, ResourceKind::Area);
        assert_eq!(recs[1].id, "hall");
    }

    #[test]
    fn flat_snapshot_defaults() {
        let recs = parse(r#"{"resources": [{"id": "light.kitchen"}, {"id": "kitchen", "kind": "area"}]}"#);
        assert_eq!(recs[0].domain, "light");
        assert!(recs[0].enabled);
        assert_eq!(recs[1].domain, "area");
    }

    #[test]
    fn bare_array_snapshot() {
        let recs = parse(r#"[{"id": "switch.fan", "enabled": false}]"#);
        assert_eq!(recs.len(), 1);
        assert!(!recs[0].enabled);
    }

    #[test]
    fn entity_domain_split() {
        assert_eq!(entity_domain("sensor.temp"), "sensor");
        assert_eq!(entity_domain("nodot"), "nodot");
    }
}
