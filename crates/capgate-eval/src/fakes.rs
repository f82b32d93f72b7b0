//! Deterministic and fault-injecting model adapters.
//!
//! `DeterministicModelAdapter` is the offline placeholder scorer: SHA-256 of
//! the prompt, first six hex digits mod 1000, divided by 1000. It backs
//! `run-evals --deterministic`. The others exist for tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use capgate_core::{Result, TrialError};
use sha2::{Digest, Sha256};

use crate::adapter::{ModelAdapter, ModelAdapterFactory, ModelTarget};

/// Score of `prompt` under the deterministic scorer, in `[0, 0.999]`.
pub fn deterministic_score(prompt: &str) -> f64 {
    let digest = hex::encode(Sha256::digest(prompt.as_bytes()));
    let prefix = u32::from_str_radix(&digest[..6], 16).unwrap_or(0);
    f64::from(prefix % 1000) / 1000.0
}

/// Pure function of the prompt; never fails.
#[derive(Debug, Default, Clone)]
pub struct DeterministicModelAdapter {
    calls: Arc<AtomicUsize>,
}

impl DeterministicModelAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `invoke` calls made through this adapter or its clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelAdapter for DeterministicModelAdapter {
    async fn invoke(&self, prompt: &str) -> std::result::Result<f64, TrialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(deterministic_score(prompt))
    }
}

/// Always returns the same score.
#[derive(Debug, Clone, Copy)]
pub struct FixedScoreAdapter(pub f64);

#[async_trait]
impl ModelAdapter for FixedScoreAdapter {
    async fn invoke(&self, _prompt: &str) -> std::result::Result<f64, TrialError> {
        Ok(self.0)
    }
}

/// Fails every prompt whose trial index (third `:` field) is in `failing`,
/// and stalls on prompts whose index is in `stalling`. Others score `score`.
#[derive(Debug, Clone, Default)]
pub struct FlakyModelAdapter {
    pub score: f64,
    pub failing: BTreeSet<u32>,
    pub stalling: BTreeSet<u32>,
}

impl FlakyModelAdapter {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, trials: impl IntoIterator<Item = u32>) -> Self {
        self.failing.extend(trials);
        self
    }

    pub fn stalling_on(mut self, trials: impl IntoIterator<Item = u32>) -> Self {
        self.stalling.extend(trials);
        self
    }
}

fn trial_index(prompt: &str) -> Option<u32> {
    prompt.split(':').nth(2).and_then(|s| s.parse().ok())
}

#[async_trait]
impl ModelAdapter for FlakyModelAdapter {
    async fn invoke(&self, prompt: &str) -> std::result::Result<f64, TrialError> {
        let index = trial_index(prompt);
        if index.is_some_and(|i| self.stalling.contains(&i)) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if index.is_some_and(|i| self.failing.contains(&i)) {
            return Err(TrialError::Failed(format!("injected failure for {}", prompt)));
        }
        Ok(self.score)
    }
}

/// Factory that hands out one shared adapter and records every target it saw.
pub struct StaticAdapterFactory {
    adapter: Arc<dyn ModelAdapter>,
    targets: Mutex<Vec<ModelTarget>>,
}

impl StaticAdapterFactory {
    pub fn new(adapter: Arc<dyn ModelAdapter>) -> Self {
        Self {
            adapter,
            targets: Mutex::new(Vec::new()),
        }
    }

    pub fn targets(&self) -> Vec<ModelTarget> {
        self.targets
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

impl ModelAdapterFactory for StaticAdapterFactory {
    fn adapter(&self, target: &ModelTarget) -> Result<Arc<dyn ModelAdapter>> {
        if let Ok(mut targets) = self.targets.lock() {
            targets.push(target.clone());
        }
        Ok(Arc::clone(&self.adapter))
    }
}
