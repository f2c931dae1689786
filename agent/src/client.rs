//! HTTP client for the control-plane-facing calls (spec §6). Supports the
//! optional dual-target mode (`DEV_API_URL`/`DEV_API_KEY`): every call goes
//! to the primary target and, best-effort, to the dev target too, so a
//! fleet can be mirrored into a staging control plane without a second
//! agent process.

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::{AgentConfig, DualTarget};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("server id is not recognized by the control plane")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

pub struct ControlPlaneClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    dev_target: Option<DualTarget>,
}

impl ControlPlaneClient {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            dev_target: config.dev_target.as_ref().map(|t| DualTarget { api_url: t.api_url.clone(), api_key: t.api_key.clone() }),
        }
    }

    /// POST `body` to `path` on the primary target, returning its parsed
    /// JSON response. Also fires the same request at the dev target if
    /// configured, logging (not propagating) any failure there. A 404 from
    /// the primary target surfaces as [`ClientError::NotFound`] so the
    /// caller can re-register and retry (spec §4.4 step 3).
    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> ClientResult<Value> {
        let primary = self.post_to(&self.api_url, &self.api_key, path, body).await?;

        if let Some(dev) = &self.dev_target {
            if let Err(err) = self.post_to(&dev.api_url, &dev.api_key, path, body).await {
                warn!(path, error = %err, "dev-target mirror request failed");
            }
        }

        Ok(primary)
    }

    async fn post_to<B: Serialize>(&self, base_url: &str, api_key: &str, path: &str, body: &B) -> ClientResult<Value> {
        let url = format!("{base_url}{path}");
        let response = self
            .http
            .post(&url)
            .header("X-Api-Key", api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }
        if !response.status().is_success() {
            return Err(ClientError::Other(anyhow::anyhow!("POST {url} returned {}", response.status())));
        }

        if response.content_length() == Some(0) {
            return Ok(Value::Null);
        }
        Ok(response.json::<Value>().await.unwrap_or(Value::Null))
    }
}
