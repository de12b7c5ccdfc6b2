use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::stream::{self, Frame};
use super::{check_status, http_client, open_stream, ChunkStream, Provider};
use crate::config::Config;
use crate::errors::ModelError;
use crate::wire::RenderedPrompt;

pub struct Ollama {
    pub model: String,
    pub url: String,
    pub timeout: Duration,
    client: Client,
}

impl Ollama {
    pub fn new(cfg: &Config) -> Self {
        Self {
            model: cfg.model.clone(),
            url: cfg
                .ollama_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".into()),
            timeout: Duration::from_secs(cfg.timeout_secs),
            client: http_client(Duration::from_secs(cfg.timeout_secs)),
        }
    }

    fn request(&self, prompt: &RenderedPrompt, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        tracing::debug!(task = %prompt.task, %url, stream, "ollama request");
        let req = self.client.post(url).json(&ChatRequest::new(&self.model, prompt, stream));
        if stream {
            req
        } else {
            req.timeout(self.timeout)
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
}

impl<'a> ChatRequest<'a> {
    fn new(model: &'a str, prompt: &'a RenderedPrompt, stream: bool) -> Self {
        let images = prompt.image.iter().map(|img| img.base64.as_str()).collect();
        Self {
            model,
            messages: vec![
                Msg { role: "system", content: &prompt.system, images: Vec::new() },
                Msg { role: "user", content: &prompt.text, images },
            ],
            stream,
            format: prompt.shape.map(|_| "json"),
            options: OllamaOptions { temperature: 0.1 },
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<MsgOut>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct MsgOut {
    #[serde(default)]
    content: String,
}

/// Ollama streams newline-delimited JSON objects, the last one with `done`.
fn parse_ndjson_line(line: &str) -> Frame {
    let parsed: ChatResponse = match serde_json::from_str(line) {
        Ok(p) => p,
        Err(e) => return Frame::Error(ModelError::Unavailable(format!("ollama stream parse error: {e}"))),
    };
    if let Some(err) = parsed.error {
        return Frame::Error(ModelError::Unavailable(format!("ollama error: {err}")));
    }
    match parsed.message {
        Some(m) if !m.content.is_empty() => Frame::Chunk(m.content),
        _ if parsed.done => Frame::Done,
        _ => Frame::Skip,
    }
}

#[async_trait]
impl Provider for Ollama {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, ModelError> {
        let resp = self.request(prompt, false).send().await?;
        let resp = check_status(resp, "Ollama").await?;
        let text = resp.text().await?;

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::Unavailable(format!("ollama response parse error: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(ModelError::Unavailable(format!("ollama error: {err}")));
        }
        let content = parsed.message.map(|m| m.content).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyOutput);
        }
        Ok(content)
    }

    async fn stream(&self, prompt: &RenderedPrompt) -> Result<ChunkStream, ModelError> {
        let resp = open_stream(self.request(prompt, true), self.timeout, "Ollama").await?;
        Ok(stream::decode(resp.bytes_stream().boxed(), self.timeout, parse_ndjson_line))
    }
}
