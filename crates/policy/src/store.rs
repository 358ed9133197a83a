//! Policy store with atomic snapshot publication

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use companion_core::PolicyError;

use crate::document::PolicyDocument;
use crate::snapshot::PolicySnapshot;

/// Holds the currently-published policy snapshot.
///
/// Readers either see the old snapshot or the new one, never a torn mix:
/// `snapshot()` clones the `Arc` under a read lock and the swap replaces the
/// pointer in one write. In-flight utterances keep the `Arc` they started
/// with until they finish.
pub struct PolicyStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    /// Load the policy from a file, or fall back to the built-in defaults
    /// when no path is given.
    pub fn open(path: Option<&Path>) -> Result<Self, PolicyError> {
        let (path, doc) = match path {
            Some(p) => (Some(p.to_path_buf()), load_document(p)?),
            None => (None, crate::default_document()),
        };

        let snapshot = PolicySnapshot::compile(&doc)?;
        tracing::info!(
            version = %snapshot.version,
            devices = snapshot.device_fences.len(),
            zones = snapshot.geo_fences.len(),
            ladder_rungs = snapshot.contact_ladder.len(),
            "Policy loaded"
        );

        Ok(Self {
            path,
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Build a store from an in-memory document (tests, dry runs).
    pub fn from_document(doc: &PolicyDocument) -> Result<Self, PolicyError> {
        let snapshot = PolicySnapshot::compile(doc)?;
        Ok(Self {
            path: None,
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Current snapshot. Cheap; callers hold the Arc for their whole pipeline.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current.read().clone()
    }

    /// Re-read the policy file and publish a new snapshot.
    ///
    /// A failed reload leaves the old snapshot in force.
    pub fn reload(&self) -> Result<String, PolicyError> {
        let path = self.path.as_deref().ok_or_else(|| PolicyError::InvalidValue {
            field: "policy_path".to_string(),
            message: "no policy file configured; running on built-in defaults".to_string(),
        })?;

        let doc = load_document(path)?;
        let snapshot = PolicySnapshot::compile(&doc)?;
        let version = snapshot.version.clone();

        *self.current.write() = Arc::new(snapshot);
        tracing::info!(version = %version, "Policy reloaded");

        Ok(version)
    }
}

fn load_document(path: &Path) -> Result<PolicyDocument, PolicyError> {
    if !path.exists() {
        return Err(PolicyError::FileNotFound(path.display().to_string()));
    }

    let content =
        std::fs::read_to_string(path).map_err(|e| PolicyError::Parse(e.to_string()))?;

    serde_yaml::from_str(&content).map_err(|e| PolicyError::Parse(e.to_string()))
}
