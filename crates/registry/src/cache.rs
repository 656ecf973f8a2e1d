//! Reuse of a built index across validation calls.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::info;

use crate::{RegistryError, RegistryIndex, SnapshotSource, load_index};

/// Holds a built [`RegistryIndex`] for sessions that validate repeatedly.
///
/// [`RegistryCache::get`] returns the cached index while every snapshot's
/// modification time is unchanged, and rebuilds the whole index otherwise.
/// The index itself is never updated in place.
#[derive(Debug)]
pub struct RegistryCache {
    sources: Vec<SnapshotSource>,
    current: Option<Cached>,
    loads: usize,
}

#[derive(Debug)]
struct Cached {
    index: Arc<RegistryIndex>,
    stamps: Vec<Option<SystemTime>>,
}

impl RegistryCache {
    /// A cache over the given snapshot sources. Nothing is read until [`get`](Self::get).
    pub fn new(sources: Vec<SnapshotSource>) -> Self {
        Self {
            sources,
            current: None,
            loads: 0,
        }
    }

    /// The current index, rebuilt first if any snapshot changed on disk.
    ///
    /// A failed rebuild drops the previously cached index so that a broken
    /// snapshot is never masked by stale data.
    pub fn get(&mut self) -> Result<Arc<RegistryIndex>, RegistryError> {
        let stamps: Vec<Option<SystemTime>> =
            self.sources.iter().map(|s| modified(&s.path)).collect();
        if let Some(cached) = &self.current
            && cached.stamps == stamps
        {
            return Ok(Arc::clone(&cached.index));
        }

        if self.current.take().is_some() {
            info!("registry snapshot changed on disk; rebuilding index");
        }
        let index = Arc::new(load_index(&self.sources)?);
        self.loads += 1;
        self.current = Some(Cached {
            index: Arc::clone(&index),
            stamps,
        });
        Ok(index)
    }

    /// How many times the index has been built.
    pub fn loads(&self) -> usize {
        self.loads
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn set_mtime(path: &Path, t: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(t)
            .unwrap();
    }

    #[test]
    fn reuses_index_while_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        std::fs::write(&path, r#"[{"id": "light.a"}]"#).unwrap();
        let mut cache = RegistryCache::new(vec![SnapshotSource::required(&path)]);

        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.loads(), 1);
    }

    #[test]
    fn rebuilds_when_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        std::fs::write(&path, r#"[{"id": "light.a"}]"#).unwrap();
        set_mtime(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));
        let mut cache = RegistryCache::new(vec![SnapshotSource::required(&path)]);
        assert!(!cache.get().unwrap().exists("light.b"));

        std::fs::write(&path, r#"[{"id": "light.a"}, {"id": "light.b"}]"#).unwrap();
        set_mtime(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(2_000));
        assert!(cache.get().unwrap().exists("light.b"));
        assert_eq!(cache.loads(), 2);
    }

    #[test]
    fn failed_rebuild_does_not_serve_stale_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        std::fs::write(&path, r#"[{"id": "light.a"}]"#).unwrap();
        let mut cache = RegistryCache::new(vec![SnapshotSource::required(&path)]);
        cache.get().unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(cache.get(), Err(RegistryError::Missing { .. })));
        assert!(matches!(cache.get(), Err(RegistryError::Missing { .. })));
    }
}
