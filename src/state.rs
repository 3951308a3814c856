use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::{ConfigTree, Error, Facts, empty_tree};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Last known configuration of one resource
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Snapshot {
    pub resource: String,

    /// When the snapshot was written
    pub taken_at: DateTime<Utc>,

    /// How the tree got here: `import` or `apply`
    #[serde(default)]
    pub source: String,

    pub config: ConfigTree,
}

/// One JSON file per resource under the state directory
///
/// Stands in for reading the switch: `apply` records the projected tree
/// after every successful run, and `snapshot --from` seeds it from a file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

// ============================================================================
// SnapshotStore Implementation
// ============================================================================

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, resource: &str) -> PathBuf {
        self.dir.join(format!("{resource}.json"))
    }

    /// Load a snapshot, or `None` if the resource was never recorded
    pub fn load(&self, resource: &str) -> Result<Option<Snapshot>> {
        let path = self.path(resource);
        if !path.exists() {
            log::debug!("No snapshot for {resource} at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;

        log::debug!("Loaded {resource} snapshot from {}", path.display());
        Ok(Some(snapshot))
    }

    /// Write a snapshot, replacing any previous one
    pub fn save(&self, resource: &str, tree: &ConfigTree, source: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create state directory: {}", self.dir.display())
        })?;

        let snapshot = Snapshot {
            resource: resource.to_string(),
            taken_at: Utc::now(),
            source: source.to_string(),
            config: tree.clone(),
        };
        let path = self.path(resource);
        let content =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;

        log::debug!("Saved {resource} snapshot to {}", path.display());
        Ok(path)
    }
}

impl Facts for SnapshotStore {
    fn fetch(&self, resource: &str) -> reconcile::Result<ConfigTree> {
        match self.load(resource) {
            Ok(snapshot) => Ok(snapshot.map(|s| s.config).unwrap_or_else(empty_tree)),
            Err(e) => Err(Error::invalid_tree(
                self.path(resource).display().to_string(),
                format!("{e:#}"),
            )),
        }
    }

    fn record_applied(&self, resource: &str, tree: &ConfigTree) -> reconcile::Result<()> {
        self.save(resource, tree, "apply").map(drop).map_err(|e| {
            Error::invalid_tree(self.path(resource).display().to_string(), format!("{e:#}"))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_snapshot_fetches_empty_tree() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        assert!(store.load("interfaces").unwrap().is_none());
        assert_eq!(store.fetch("interfaces").unwrap(), json!({}));
    }

    #[test]
    fn test_save_then_fetch() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested"));
        let tree = json!({"interfaces": [{"name": "Ethernet0", "mtu": 9000}]});

        let path = store.save("interfaces", &tree, "import").unwrap();
        assert!(path.ends_with("interfaces.json"));

        let snapshot = store.load("interfaces").unwrap().unwrap();
        assert_eq!(snapshot.resource, "interfaces");
        assert_eq!(snapshot.source, "import");
        assert_eq!(store.fetch("interfaces").unwrap(), tree);
    }

    #[test]
    fn test_record_applied_replaces_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store
            .save("mclag", &json!({"domain_id": 1}), "import")
            .unwrap();

        store
            .record_applied("mclag", &json!({"domain_id": 2}))
            .unwrap();

        let snapshot = store.load("mclag").unwrap().unwrap();
        assert_eq!(snapshot.source, "apply");
        assert_eq!(snapshot.config, json!({"domain_id": 2}));
    }

    #[test]
    fn test_corrupt_snapshot_is_an_invalid_tree() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ars.json"), "not json").unwrap();
        let store = SnapshotStore::new(dir.path());

        assert!(matches!(
            store.fetch("ars"),
            Err(Error::InvalidTree { .. })
        ));
    }
}
