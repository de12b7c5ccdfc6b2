use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::stream::{self, Frame};
use super::{check_status, http_client, open_stream, ChunkStream, Provider};
use crate::config::Config;
use crate::errors::ModelError;
use crate::wire::RenderedPrompt;

pub struct Anthropic {
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
    pub api_base: String,
    pub api_version: String,
    pub max_tokens: u32,
    client: Client,
}

impl Anthropic {
    pub fn new(cfg: &Config, api_key: String) -> Self {
        Self {
            model: cfg.model.clone(),
            api_key,
            timeout: Duration::from_secs(cfg.timeout_secs),
            api_base: cfg.anthropic_url.clone(),
            api_version: cfg.anthropic_version.clone(),
            max_tokens: cfg.max_tokens,
            client: http_client(Duration::from_secs(cfg.timeout_secs)),
        }
    }

    fn request(&self, prompt: &RenderedPrompt, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/messages", self.api_base.trim_end_matches('/'));
        tracing::debug!(task = %prompt.task, %url, stream, "anthropic request");
        let req = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&MsgRequest::new(&self.model, self.max_tokens, prompt, stream));
        if stream {
            req
        } else {
            req.timeout(self.timeout)
        }
    }
}

#[derive(Serialize)]
struct MsgRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Msg<'a>>,
    system: &'a str,
    stream: bool,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Part<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    r#type: &'static str,
    media_type: &'a str,
    data: &'a str,
}

impl<'a> MsgRequest<'a> {
    fn new(model: &'a str, max_tokens: u32, prompt: &'a RenderedPrompt, stream: bool) -> Self {
        let mut content = Vec::with_capacity(2);
        if let Some(img) = &prompt.image {
            content.push(Part::Image {
                source: ImageSource {
                    r#type: "base64",
                    media_type: &img.media_type,
                    data: &img.base64,
                },
            });
        }
        content.push(Part::Text { text: &prompt.text });
        Self {
            model,
            max_tokens,
            messages: vec![Msg { role: "user", content }],
            system: &prompt.system,
            stream,
        }
    }
}

#[derive(Deserialize)]
struct MsgResponse {
    content: Vec<Block>,
}

#[derive(Deserialize)]
struct Block {
    #[serde(default)]
    text: String,
    #[serde(default)]
    r#type: String,
}

fn parse_event_line(line: &str) -> Frame {
    let Some(data) = stream::sse_data(line) else {
        return Frame::Skip;
    };
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Frame::Error(ModelError::Unavailable(format!("anthropic stream parse error: {e}"))),
    };
    match v["type"].as_str() {
        Some("content_block_delta") => match v["delta"]["text"].as_str() {
            Some(t) if !t.is_empty() => Frame::Chunk(t.to_string()),
            _ => Frame::Skip,
        },
        Some("message_stop") => Frame::Done,
        Some("error") => Frame::Error(ModelError::Unavailable(format!(
            "anthropic stream error: {}",
            v["error"]["message"].as_str().unwrap_or("unknown")
        ))),
        _ => Frame::Skip,
    }
}

#[async_trait]
impl Provider for Anthropic {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, ModelError> {
        let resp = self.request(prompt, false).send().await?;
        let resp = check_status(resp, "Anthropic").await?;
        let text = resp.text().await?;

        let parsed: MsgResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::Unavailable(format!("anthropic response parse error: {e}")))?;

        let content: String = parsed
            .content
            .into_iter()
            .filter(|b| b.r#type == "text")
            .map(|b| b.text)
            .collect();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyOutput);
        }
        Ok(content)
    }

    async fn stream(&self, prompt: &RenderedPrompt) -> Result<ChunkStream, ModelError> {
        let resp = open_stream(self.request(prompt, true), self.timeout, "Anthropic").await?;
        Ok(stream::decode(resp.bytes_stream().boxed(), self.timeout, parse_event_line))
    }
}
