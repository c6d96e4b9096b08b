//! Shared, atomically reloadable skill snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::loader::{self, LoadError, SkillSnapshot};

/// Holds the current [`SkillSnapshot`].
///
/// Readers clone the `Arc` and keep using it for the rest of their request,
/// so a reload never exposes a half-built snapshot.
pub struct SkillStore {
    directory: PathBuf,
    current: RwLock<Arc<SkillSnapshot>>,
}

impl SkillStore {
    /// Load `directory` eagerly. Fails if the directory does not exist.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let directory = directory.into();
        let snapshot = loader::load(&directory)?;
        tracing::info!(
            dir = %directory.display(),
            skills = snapshot.count(),
            warnings = snapshot.warnings().len(),
            "Skills loaded"
        );
        Ok(Self {
            directory,
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Wrap an already built snapshot.
    pub fn from_snapshot(snapshot: SkillSnapshot) -> Self {
        Self {
            directory: snapshot.directory().to_path_buf(),
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The snapshot in effect right now.
    pub fn snapshot(&self) -> Arc<SkillSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count(&self) -> usize {
        self.snapshot().count()
    }

    /// Rescan the directory and swap the snapshot in one step.
    ///
    /// On error the previous snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<SkillSnapshot>, LoadError> {
        let fresh = Arc::new(loader::load(&self.directory)?);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = fresh.clone();
        tracing::info!(
            skills = fresh.count(),
            warnings = fresh.warnings().len(),
            "Skills reloaded"
        );
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(dir: &Path, name: &str, trigger: &str) {
        std::fs::write(
            dir.join(format!("{name}.skill")),
            format!("---\nname: {name}\ntriggers: [{trigger}]\n---\nDo {name}."),
        )
        .unwrap();
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(SkillStore::open(tmp.path().join("missing")).is_err());
    }

    #[test]
    fn test_reload_swaps_whole_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "one", "a");
        let store = SkillStore::open(tmp.path()).unwrap();

        let held = store.snapshot();
        assert_eq!(held.count(), 1);

        write_skill(tmp.path(), "two", "b");
        store.reload().unwrap();

        // old readers keep their snapshot, new readers see the new one
        assert_eq!(held.count(), 1);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("skills");
        std::fs::create_dir(&dir).unwrap();
        write_skill(&dir, "one", "a");
        let store = SkillStore::open(&dir).unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.count(), 1);
    }
}
