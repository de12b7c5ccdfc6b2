use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::ProviderKind;
use crate::config::Config;
use crate::errors::ModelError;
use crate::wire::RenderedPrompt;

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod stream;

/// Lazy, finite, single-pass sequence of text chunks.
pub type ChunkStream = BoxStream<'static, Result<String, ModelError>>;

/// A generative-text backend.
///
/// `complete` returns the raw reply text; structure is checked by the caller.
/// When `prompt.shape` is set, providers ask the backend for JSON output.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, ModelError>;

    async fn stream(&self, prompt: &RenderedPrompt) -> Result<ChunkStream, ModelError>;
}

pub type DynProvider = Arc<dyn Provider>;

pub fn make_provider(cfg: &Config) -> Result<DynProvider> {
    match cfg.provider {
        ProviderKind::OpenAI => {
            let api_key = std::env::var(&cfg.openai_key_env)
                .map_err(|_| anyhow!("{} env var is not set", cfg.openai_key_env))?;
            Ok(Arc::new(openai::OpenAIProvider::new(cfg, api_key)))
        }
        ProviderKind::Anthropic => {
            let api_key = std::env::var(&cfg.anthropic_key_env)
                .map_err(|_| anyhow!("{} env var is not set", cfg.anthropic_key_env))?;
            Ok(Arc::new(anthropic::Anthropic::new(cfg, api_key)))
        }
        ProviderKind::Ollama => Ok(Arc::new(ollama::Ollama::new(cfg))),
    }
}

/// Client whose connect phase is bounded. Whole-request deadlines are set
/// per call, and only on blocking calls.
pub(crate) fn http_client(connect_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default http client");
            reqwest::Client::new()
        })
}

/// Send a streaming request. Only the wait for response headers is bounded
/// here; the body is bounded per chunk by [`stream::decode`].
pub(crate) async fn open_stream(
    req: reqwest::RequestBuilder,
    idle: Duration,
    who: &str,
) -> Result<reqwest::Response, ModelError> {
    let resp = tokio::time::timeout(idle, req.send())
        .await
        .map_err(|_| ModelError::Unavailable(format!("{who} did not answer within {}s", idle.as_secs())))??;
    check_status(resp, who).await
}

/// Fails with the status and body when the backend did not answer 2xx.
pub(crate) async fn check_status(resp: reqwest::Response, who: &str) -> Result<reqwest::Response, ModelError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ModelError::Unavailable(format!("{who} API error ({status}): {body}")))
}
