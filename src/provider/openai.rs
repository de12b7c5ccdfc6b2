use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::stream::{self, Frame};
use super::{check_status, http_client, open_stream, ChunkStream};
use crate::config::Config;
use crate::errors::ModelError;
use crate::wire::RenderedPrompt;

/// OpenAI chat completions backend.
pub struct OpenAIProvider {
    model: String,
    api_base: String,
    api_key: String,
    max_tokens: u32,
    client: Client,
    timeout_secs: u64,
}

impl OpenAIProvider {
    pub fn new(cfg: &Config, api_key: String) -> Self {
        Self {
            model: cfg.model.clone(),
            api_base: cfg.openai_url.clone(),
            api_key,
            max_tokens: cfg.max_tokens,
            client: http_client(Duration::from_secs(cfg.timeout_secs)),
            timeout_secs: cfg.timeout_secs,
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

/// Request body; the user turn carries the image as an `image_url` part.
fn request_body(model: &str, max_tokens: u32, prompt: &RenderedPrompt, stream: bool) -> Value {
    let user = match &prompt.image {
        Some(img) => json!([
            { "type": "text", "text": prompt.text },
            { "type": "image_url", "image_url": { "url": img.data_uri() } }
        ]),
        None => json!(prompt.text),
    };
    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": [
            { "role": "system", "content": prompt.system },
            { "role": "user", "content": user }
        ],
        "temperature": 0.2,
        "stream": stream,
    });
    if prompt.shape.is_some() {
        // Force a valid JSON object in the response.
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

fn parse_sse_line(line: &str) -> Frame {
    let Some(data) = stream::sse_data(line) else {
        return Frame::Skip;
    };
    if data == "[DONE]" {
        return Frame::Done;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(v) => match v["choices"][0]["delta"]["content"].as_str() {
            Some(text) if !text.is_empty() => Frame::Chunk(text.to_string()),
            _ => Frame::Skip,
        },
        Err(e) => Frame::Error(ModelError::Unavailable(format!("openai stream parse error: {e}"))),
    }
}

#[async_trait]
impl super::Provider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, ModelError> {
        let body = request_body(&self.model, self.max_tokens, prompt, false);
        tracing::debug!(task = %prompt.task, url = %self.url(), "openai request");

        let resp = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp, "OpenAI").await?;
        let text = resp.text().await?;

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::Unavailable(format!("failed to parse OpenAI response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyOutput);
        }
        Ok(content)
    }

    async fn stream(&self, prompt: &RenderedPrompt) -> Result<ChunkStream, ModelError> {
        let body = request_body(&self.model, self.max_tokens, prompt, true);
        tracing::debug!(task = %prompt.task, url = %self.url(), "openai stream request");

        let req = self.client.post(self.url()).bearer_auth(&self.api_key).json(&body);
        let idle = Duration::from_secs(self.timeout_secs);
        let resp = open_stream(req, idle, "OpenAI").await?;
        Ok(stream::decode(resp.bytes_stream().boxed(), idle, parse_sse_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ImageData, Task};

    fn prompt(shape: Option<&'static str>, image: Option<ImageData>) -> RenderedPrompt {
        RenderedPrompt {
            task: Task::Classify,
            system: "sys".into(),
            text: "hello".into(),
            image,
            shape,
        }
    }

    #[test]
    fn structured_prompts_request_json() {
        let body = request_body("m", 100, &prompt(Some("classification"), None), false);
        assert_eq!(body["response_format"]["type"], "json_object");
        let body = request_body("m", 100, &prompt(None, None), true);
        assert!(body.get("response_format").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn image_becomes_content_part() {
        let img = ImageData::from_data_uri("data:image/jpeg;base64,QUJD").unwrap();
        let body = request_body("m", 100, &prompt(None, Some(img)), false);
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
    }

    #[test]
    fn sse_lines_map_to_frames() {
        assert!(matches!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"<h1>"}}]}"#),
            Frame::Chunk(ref c) if c == "<h1>"
        ));
        assert!(matches!(parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#), Frame::Skip));
        assert!(matches!(parse_sse_line("data: [DONE]"), Frame::Done));
        assert!(matches!(parse_sse_line(": keep-alive"), Frame::Skip));
    }
}
