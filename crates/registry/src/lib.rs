//! Resource registry index for the hacheck validator.
//!
//! Loads the controller's registry snapshots (entities, devices, areas) into
//! an immutable, hash-indexed [`RegistryIndex`]. The index is built once per
//! run and passed explicitly to everything that needs it; [`RegistryCache`]
//! rebuilds it wholesale when a snapshot file changes on disk.

#![warn(missing_docs)]

mod cache;
mod snapshot;

pub use cache::RegistryCache;
pub use snapshot::entity_domain;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use snapshot::SnapshotFile;

/// Errors that make the registry unavailable for a run.
///
/// Loading is all-or-nothing: any of these means no index is produced.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A required snapshot file does not exist.
    #[error("registry snapshot not found: {}", path.display())]
    Missing {
        /// The path that was expected to hold the snapshot.
        path: PathBuf,
    },

    /// The snapshot file exists but could not be read.
    #[error("failed to read registry snapshot {}", path.display())]
    Io {
        /// The snapshot path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot is not valid JSON in a recognized shape.
    #[error("corrupt registry snapshot {}: {source}", path.display())]
    Corrupt {
        /// The snapshot path.
        path: PathBuf,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot parsed but violates an index invariant.
    #[error("invalid registry snapshot {}: {reason}", path.display())]
    Invalid {
        /// The snapshot path (empty for in-memory record sets).
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },
}

/// Category of an addressable resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// An entity (`light.kitchen`).
    #[default]
    Entity,
    /// A physical or virtual device, keyed by its opaque registry id.
    Device,
    /// An area (`living_room`).
    Area,
}

impl ResourceKind {
    /// Lowercase name, also used as the domain of device and area records.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Entity => "entity",
            ResourceKind::Device => "device",
            ResourceKind::Area => "area",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRecord {
    /// Identifier, unique within the registry.
    pub id: String,
    /// Display name, if the registry has one.
    pub name: Option<String>,
    /// Owning domain (`light`, `sensor`, ...; `device` / `area` for those kinds).
    pub domain: String,
    /// Resource category.
    pub kind: ResourceKind,
    /// Area assignment. Entities without their own area inherit their device's.
    pub area_id: Option<String>,
    /// Device linkage (entities only).
    pub device_id: Option<String>,
    /// `false` when the controller has the resource disabled.
    pub enabled: bool,
    /// Device-class metadata (entities only).
    pub device_class: Option<String>,
}

/// Where to read one snapshot file from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSource {
    /// Snapshot path.
    pub path: PathBuf,
    /// Whether a missing file aborts the load. Optional sources are skipped
    /// when absent but still fail the load when present and corrupt.
    pub required: bool,
}

impl SnapshotSource {
    /// A snapshot that must exist.
    pub fn required(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: true,
        }
    }

    /// A snapshot that is used only when present.
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: false,
        }
    }
}

/// Filter for [`RegistryIndex::search`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Exact domain.
    pub domain: Option<String>,
    /// Exact area id.
    pub area_id: Option<String>,
    /// Exact device class.
    pub device_class: Option<String>,
    /// Case-insensitive substring of the identifier or display name.
    pub text: Option<String>,
    /// Resource kind.
    pub kind: Option<ResourceKind>,
}

impl SearchQuery {
    /// Whether `record` satisfies every set field.
    pub fn matches(&self, record: &ResourceRecord) -> bool {
        if self.domain.as_deref().is_some_and(|d| d != record.domain) {
            return false;
        }
        if self
            .area_id
            .as_deref()
            .is_some_and(|a| record.area_id.as_deref() != Some(a))
        {
            return false;
        }
        if self
            .device_class
            .as_deref()
            .is_some_and(|c| record.device_class.as_deref() != Some(c))
        {
            return false;
        }
        if self.kind.is_some_and(|k| k != record.kind) {
            return false;
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let in_id = record.id.to_lowercase().contains(&needle);
            let in_name = record
                .name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle));
            if !in_id && !in_name {
                return false;
            }
        }
        true
    }
}

/// Record counts for logging and the `entities` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Entity records.
    pub entities: usize,
    /// Device records.
    pub devices: usize,
    /// Area records.
    pub areas: usize,
    /// Records of any kind that are disabled.
    pub disabled: usize,
}

/// Immutable, hash-indexed view of the registry.
#[derive(Debug, Default)]
pub struct RegistryIndex {
    records: Vec<ResourceRecord>,
    by_id: HashMap<String, usize>,
    /// Record indices per domain, sorted by identifier.
    by_domain: HashMap<String, Vec<usize>>,
}

impl RegistryIndex {
    /// Build an index from in-memory records (e.g. injected test fixtures).
    pub fn from_records(records: Vec<ResourceRecord>) -> Result<Self, RegistryError> {
        Self::build(records, Path::new(""))
    }

    fn build(mut records: Vec<ResourceRecord>, origin: &Path) -> Result<Self, RegistryError> {
        let mut by_id = HashMap::with_capacity(records.len());
        for (idx, rec) in records.iter().enumerate() {
            if rec.id.is_empty() {
                return Err(RegistryError::Invalid {
                    path: origin.to_path_buf(),
                    reason: format!("record #{idx} has an empty identifier"),
                });
            }
            if rec.kind == ResourceKind::Entity && !rec.id.contains('.') {
                return Err(RegistryError::Invalid {
                    path: origin.to_path_buf(),
                    reason: format!("entity identifier `{}` has no domain", rec.id),
                });
            }
            if by_id.insert(rec.id.clone(), idx).is_some() {
                return Err(RegistryError::Invalid {
                    path: origin.to_path_buf(),
                    reason: format!("duplicate identifier `{}`", rec.id),
                });
            }
        }

        // Entities without an area of their own sit in their device's area.
        let device_areas: HashMap<String, String> = records
            .iter()
            .filter(|r| r.kind == ResourceKind::Device)
            .filter_map(|r| Some((r.id.clone(), r.area_id.clone()?)))
            .collect();
        for rec in records.iter_mut() {
            if rec.area_id.is_none()
                && let Some(device) = &rec.device_id
            {
                rec.area_id = device_areas.get(device).cloned();
            }
        }

        let mut by_domain: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, rec) in records.iter().enumerate() {
            by_domain.entry(rec.domain.clone()).or_default().push(idx);
        }
        for members in by_domain.values_mut() {
            members.sort_by(|a, b| records[*a].id.cmp(&records[*b].id));
        }

        Ok(Self {
            records,
            by_id,
            by_domain,
        })
    }

    /// Look up a record by identifier.
    pub fn resolve(&self, id: &str) -> Option<&ResourceRecord> {
        self.by_id.get(id).map(|&idx| &self.records[idx])
    }

    /// Whether a record with this identifier exists.
    pub fn exists(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Whether the identifier exists and is enabled. Unknown identifiers
    /// count as disabled.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.resolve(id).is_some_and(|r| r.enabled)
    }

    /// All records satisfying `predicate`, ordered by domain then identifier.
    pub fn search(&self, predicate: impl Fn(&ResourceRecord) -> bool) -> Vec<&ResourceRecord> {
        let mut hits: Vec<&ResourceRecord> = self.records.iter().filter(|r| predicate(r)).collect();
        hits.sort_by(|a, b| a.domain.cmp(&b.domain).then_with(|| a.id.cmp(&b.id)));
        hits
    }

    /// Records of one domain, ordered by identifier.
    pub fn in_domain<'a>(&'a self, domain: &str) -> impl Iterator<Item = &'a ResourceRecord> + use<'a> {
        self.by_domain
            .get(domain)
            .into_iter()
            .flatten()
            .map(|&idx| &self.records[idx])
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Per-kind record counts.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for rec in &self.records {
            match rec.kind {
                ResourceKind::Entity => stats.entities += 1,
                ResourceKind::Device => stats.devices += 1,
                ResourceKind::Area => stats.areas += 1,
            }
            if !rec.enabled {
                stats.disabled += 1;
            }
        }
        stats
    }
}

/// Load and index a single snapshot file.
pub fn load_snapshot(path: &Path) -> Result<RegistryIndex, RegistryError> {
    load_index(&[SnapshotSource::required(path)])
}

/// Load every source and build one index over all of them.
///
/// Fails without producing a partial index if a required file is missing,
/// any present file is unreadable or corrupt, or identifiers collide across
/// files.
pub fn load_index(sources: &[SnapshotSource]) -> Result<RegistryIndex, RegistryError> {
    let mut records = Vec::new();
    let mut origin = PathBuf::new();
    for source in sources {
        let text = match std::fs::read_to_string(&source.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if source.required {
                    return Err(RegistryError::Missing {
                        path: source.path.clone(),
                    });
                }
                debug!(path = %source.path.display(), "optional registry snapshot absent");
                continue;
            }
            Err(source_err) => {
                return Err(RegistryError::Io {
                    path: source.path.clone(),
                    source: source_err,
                });
            }
        };
        let file: SnapshotFile =
            serde_json::from_str(&text).map_err(|e| RegistryError::Corrupt {
                path: source.path.clone(),
                source: e,
            })?;
        records.extend(file.into_records());
        origin = source.path.clone();
    }

    let index = RegistryIndex::build(records, &origin)?;
    let stats = index.stats();
    info!(
        entities = stats.entities,
        devices = stats.devices,
        areas = stats.areas,
        disabled = stats.disabled,
        "registry index built"
    );
    Ok(index)
}
