//! Artifact storage keyed by run id.
//!
//! Every artifact is write-once: [`ArtifactStore::put_once`] accepts a
//! rewrite only when the bytes are identical, so re-invoking a stage against
//! an already-written artifact is harmless and a conflicting rewrite is
//! refused.

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::error::{GateError, Result};

/// What `put_once` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The artifact did not exist and was written.
    Written,
    /// An identical artifact was already present; nothing was written.
    Unchanged,
}

/// Durable artifact store with read-after-write consistency for a single writer.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Read the artifact at `key`. Missing keys are [`GateError::ArtifactMissing`].
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Atomically write `data` at `key` unless it already exists.
    ///
    /// Existing identical content yields [`PutOutcome::Unchanged`]; existing
    /// different content is [`GateError::ArtifactConflict`].
    async fn put_once(&self, key: &str, data: &[u8]) -> Result<PutOutcome>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// User-visible location of `key` (a path for filesystem stores).
    fn describe(&self, key: &str) -> String;
}

/// Serialize `value` as pretty JSON and write it once.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn ArtifactStore,
    key: &str,
    value: &T,
) -> Result<PutOutcome> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    store.put_once(key, &bytes).await
}

/// Read and deserialize the JSON artifact at `key`.
///
/// Content that does not parse is [`GateError::MalformedArtifact`].
pub async fn get_json<T: DeserializeOwned>(store: &dyn ArtifactStore, key: &str) -> Result<T> {
    let bytes = store.get(key).await?;
    serde_json::from_slice(&bytes).map_err(|e| GateError::MalformedArtifact {
        path: store.describe(key),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryArtifactStore;
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        value: u32,
    }

    #[tokio::test]
    async fn test_json_roundtrip_through_store() {
        let store = MemoryArtifactStore::new();
        let outcome = put_json(&store, "a.json", &Doc { value: 7 }).await.unwrap();
        assert_eq!(outcome, PutOutcome::Written);
        let doc: Doc = get_json(&store, "a.json").await.unwrap();
        assert_eq!(doc, Doc { value: 7 });
    }

    #[tokio::test]
    async fn test_put_json_same_value_is_unchanged() {
        let store = MemoryArtifactStore::new();
        put_json(&store, "a.json", &Doc { value: 7 }).await.unwrap();
        let again = put_json(&store, "a.json", &Doc { value: 7 }).await.unwrap();
        assert_eq!(again, PutOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_malformed_artifact_names_key() {
        let store = MemoryArtifactStore::new();
        store.put_once("bad.json", b"{not json").await.unwrap();
        match get_json::<Doc>(&store, "bad.json").await {
            Err(GateError::MalformedArtifact { path, .. }) => {
                assert_eq!(path, "memory://bad.json")
            }
            other => panic!("expected MalformedArtifact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_shape_is_malformed() {
        let store = MemoryArtifactStore::new();
        store.put_once("shape.json", br#"{"value": "seven"}"#).await.unwrap();
        let err = get_json::<Doc>(&store, "shape.json").await.unwrap_err();
        assert!(matches!(err, GateError::MalformedArtifact { .. }));
    }
}
