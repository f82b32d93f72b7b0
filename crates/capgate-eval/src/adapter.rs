//! Model adapter interface and the HTTP-backed implementation.
//!
//! The runner depends only on [`ModelAdapter`]; a [`ModelAdapterFactory`]
//! builds one adapter per suite from the suite's resolved [`ModelTarget`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use capgate_core::{GateError, Result, TrialError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Endpoint and credentials a suite's trials are sent to.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelTarget {
    pub endpoint: String,
    pub token: Option<String>,
    /// Suite limits forwarded with every request.
    pub limits: BTreeMap<String, String>,
}

impl std::fmt::Debug for ModelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelTarget")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("limits", &self.limits)
            .finish()
    }
}

/// Scores one trial prompt.
///
/// Implementations may fail or hang; the runner applies the per-trial timeout
/// and range check.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn invoke(&self, prompt: &str) -> std::result::Result<f64, TrialError>;
}

/// Builds the adapter for a suite.
pub trait ModelAdapterFactory: Send + Sync {
    fn adapter(&self, target: &ModelTarget) -> Result<Arc<dyn ModelAdapter>>;
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    prompt: &'a str,
    limits: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f64,
}

/// Adapter that POSTs `{"prompt", "limits"}` to the endpoint and reads `{"score"}`.
pub struct HttpModelAdapter {
    target: ModelTarget,
    http_client: reqwest::Client,
}

impl HttpModelAdapter {
    pub fn new(target: ModelTarget, http_client: reqwest::Client) -> Self {
        Self {
            target,
            http_client,
        }
    }
}

#[async_trait]
impl ModelAdapter for HttpModelAdapter {
    async fn invoke(&self, prompt: &str) -> std::result::Result<f64, TrialError> {
        let mut request = self
            .http_client
            .post(&self.target.endpoint)
            .json(&ScoreRequest {
                prompt,
                limits: &self.target.limits,
            });
        if let Some(token) = &self.target.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TrialError::Failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrialError::Failed(format!("endpoint returned HTTP {}", status)));
        }

        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| TrialError::Failed(format!("invalid score response: {}", e)))?;
        debug!(prompt = %prompt, score = body.score, "model scored trial");
        Ok(body.score)
    }
}

/// Factory producing [`HttpModelAdapter`]s that share one connection pool.
pub struct HttpAdapterFactory {
    http_client: reqwest::Client,
}

impl HttpAdapterFactory {
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("capgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GateError::config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }
}

impl ModelAdapterFactory for HttpAdapterFactory {
    fn adapter(&self, target: &ModelTarget) -> Result<Arc<dyn ModelAdapter>> {
        let endpoint = target.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(GateError::config(format!(
                "model endpoint must be an http(s) URL, got '{}'",
                endpoint
            )));
        }
        Ok(Arc::new(HttpModelAdapter::new(
            target.clone(),
            self.http_client.clone(),
        )))
    }
}
