use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use super::{ArtifactStore, PutOutcome};
use crate::domain::error::{GateError, Result};

/// Filesystem-backed artifact store: one file per key in a flat directory.
///
/// Layout: `<dir>/<runId>.json`, `<dir>/<runId>.summary.json`, `<dir>/<runId>.gate.json`
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(GateError::config(format!("invalid artifact key: '{}'", key)));
        }
        Ok(self.dir.join(key))
    }

    fn compare_existing(&self, path: &Path, data: &[u8]) -> Result<PutOutcome> {
        let existing = fs::read(path)?;
        if existing == data {
            Ok(PutOutcome::Unchanged)
        } else {
            Err(GateError::ArtifactConflict {
                path: path.display().to_string(),
            })
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.artifact_path(key)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                GateError::ArtifactMissing {
                    path: path.display().to_string(),
                }
            } else {
                GateError::Io(e)
            }
        })
    }

    async fn put_once(&self, key: &str, data: &[u8]) -> Result<PutOutcome> {
        let path = self.artifact_path(key)?;

        if path.exists() {
            return self.compare_existing(&path, data);
        }

        fs::create_dir_all(&self.dir)?;

        // Atomic write: temp file in the same directory, then a no-clobber rename.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(path = %path.display(), bytes = data.len(), "artifact written");
                Ok(PutOutcome::Written)
            }
            // Lost a race with another writer.
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                self.compare_existing(&path, data)
            }
            Err(e) => Err(GateError::Io(e.error)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.artifact_path(key)?.exists())
    }

    fn describe(&self, key: &str) -> String {
        self.dir.join(key).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("out"));
        (dir, store)
    }

    #[tokio::test]
    async fn artifact_roundtrip_creates_dir() {
        let (_dir, store) = make_store();
        let outcome = store.put_once("gate-1.json", b"{}").await.unwrap();
        assert_eq!(outcome, PutOutcome::Written);
        assert_eq!(store.get("gate-1.json").await.unwrap(), b"{}");
        assert!(store.exists("gate-1.json").await.unwrap());
    }

    #[tokio::test]
    async fn identical_rewrite_is_unchanged() {
        let (_dir, store) = make_store();
        store.put_once("gate-1.gate.json", b"promote").await.unwrap();
        let again = store.put_once("gate-1.gate.json", b"promote").await.unwrap();
        assert_eq!(again, PutOutcome::Unchanged);
    }

    #[tokio::test]
    async fn conflicting_rewrite_is_refused_and_original_kept() {
        let (_dir, store) = make_store();
        store.put_once("gate-1.gate.json", b"promote").await.unwrap();
        match store.put_once("gate-1.gate.json", b"reject").await {
            Err(GateError::ArtifactConflict { path }) => {
                assert!(path.ends_with("gate-1.gate.json"))
            }
            other => panic!("expected ArtifactConflict, got {other:?}"),
        }
        assert_eq!(store.get("gate-1.gate.json").await.unwrap(), b"promote");
    }

    #[tokio::test]
    async fn missing_artifact_names_path() {
        let (_dir, store) = make_store();
        match store.get("gate-missing.summary.json").await {
            Err(GateError::ArtifactMissing { path }) => {
                assert!(path.ends_with("gate-missing.summary.json"));
                assert!(path.contains("out"));
            }
            other => panic!("expected ArtifactMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let (_dir, store) = make_store();
        store.put_once("gate-1.json", b"data").await.unwrap();
        let entries: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let (_dir, store) = make_store();
        assert!(store.put_once("../escape.json", b"x").await.is_err());
        assert!(store.get("a/b.json").await.is_err());
    }
}
