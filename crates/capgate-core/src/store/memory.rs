//! In-memory artifact store (testing only).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ArtifactStore, PutOutcome};
use crate::domain::error::{GateError, Result};

/// Artifact store backed by a `HashMap<key, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = artifacts.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        artifacts
            .get(key)
            .cloned()
            .ok_or_else(|| GateError::ArtifactMissing {
                path: self.describe(key),
            })
    }

    async fn put_once(&self, key: &str, data: &[u8]) -> Result<PutOutcome> {
        let mut artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        match artifacts.get(key) {
            Some(existing) if existing.as_slice() == data => Ok(PutOutcome::Unchanged),
            Some(_) => Err(GateError::ArtifactConflict {
                path: self.describe(key),
            }),
            None => {
                artifacts.insert(key.to_string(), data.to_vec());
                Ok(PutOutcome::Written)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(artifacts.contains_key(key))
    }

    fn describe(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}
