//! Model invocation adapter.
//!
//! Two explicit operations: [`ModelAdapter::invoke`] waits for the whole reply
//! and types it against a [`Shape`]; [`ModelAdapter::invoke_streaming`] hands
//! back chunks as they arrive without any validation. Neither retries.

pub mod repair;

use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::errors::ModelError;
use crate::log::Transcript;
use crate::provider::{ChunkStream, Provider};
use crate::schema::{self, Shape};
use crate::wire::RenderedPrompt;

#[derive(Clone)]
pub struct ModelAdapter {
    provider: Arc<dyn Provider>,
    transcript: Option<Transcript>,
}

impl ModelAdapter {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider, transcript: None }
    }

    /// Record every blocking exchange under the given transcript.
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Raw reply text for a blocking call. Blank output is `EmptyOutput`.
    pub async fn invoke_raw(&self, prompt: &RenderedPrompt) -> Result<String, ModelError> {
        tracing::info!(provider = self.provider.name(), task = %prompt.task, "model call");
        let result = self.provider.complete(prompt).await;
        if let Some(t) = &self.transcript {
            t.record(prompt, &result);
        }
        let raw = result?;
        if raw.trim().is_empty() {
            return Err(ModelError::EmptyOutput);
        }
        tracing::debug!(task = %prompt.task, bytes = raw.len(), "model reply");
        Ok(raw)
    }

    /// Blocking call typed against `shape`.
    pub async fn invoke<T: DeserializeOwned>(&self, prompt: &RenderedPrompt, shape: &Shape) -> Result<T, ModelError> {
        let raw = self.invoke_raw(prompt).await?;
        let value = repair::parse_json(&raw).map_err(|reason| ModelError::Malformed { reason, raw })?;
        Ok(schema::validate(shape, value)?)
    }

    /// Streaming call. A stream that ends without any text yields one
    /// `EmptyOutput` error; the first error ends the stream.
    pub async fn invoke_streaming(&self, prompt: &RenderedPrompt) -> Result<ChunkStream, ModelError> {
        tracing::info!(provider = self.provider.name(), task = %prompt.task, "model stream");
        let stage = self.transcript.as_ref().map(|t| (t.clone(), t.record_request(prompt)));
        let inner = match self.provider.stream(prompt).await {
            Ok(inner) => inner,
            Err(e) => {
                if let Some((t, stage)) = &stage {
                    t.record_response(stage, Err(&e));
                }
                return Err(e);
            }
        };
        Ok(guard_empty(match stage {
            Some((t, stage)) => record_stream(inner, t, stage),
            None => inner,
        }))
    }
}

/// Pass chunks through, writing the joined text (or the error) to the
/// transcript once the stream ends.
fn record_stream(inner: ChunkStream, transcript: Transcript, stage: String) -> ChunkStream {
    let state = (inner, String::new(), Some((transcript, stage)));
    stream::unfold(state, |(mut inner, mut text, mut pending)| async move {
        let (t, stage) = pending.take()?;
        match inner.next().await {
            Some(Ok(chunk)) => {
                text.push_str(&chunk);
                Some((Ok(chunk), (inner, text, Some((t, stage)))))
            }
            Some(Err(e)) => {
                t.record_response(&stage, Err(&e));
                Some((Err(e), (inner, text, None)))
            }
            None => {
                t.record_response(&stage, Ok(text.as_str()));
                None
            }
        }
    })
    .boxed()
}

fn guard_empty(inner: ChunkStream) -> ChunkStream {
    stream::unfold((inner, false, false), |(mut inner, seen, done)| async move {
        if done {
            return None;
        }
        match inner.next().await {
            Some(Ok(chunk)) => {
                let seen = seen || !chunk.trim().is_empty();
                Some((Ok(chunk), (inner, seen, false)))
            }
            Some(Err(e)) => Some((Err(e), (inner, seen, true))),
            None if !seen => Some((Err(ModelError::EmptyOutput), (inner, seen, true))),
            None => None,
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::wire::{Classification, Task};

    struct Canned {
        reply: Mutex<Option<Result<String, ModelError>>>,
        chunks: Vec<&'static str>,
    }

    #[async_trait]
    impl Provider for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn complete(&self, _prompt: &RenderedPrompt) -> Result<String, ModelError> {
            self.reply.lock().take().unwrap_or(Err(ModelError::EmptyOutput))
        }

        async fn stream(&self, _prompt: &RenderedPrompt) -> Result<ChunkStream, ModelError> {
            let items: Vec<Result<String, ModelError>> = self.chunks.iter().map(|c| Ok(c.to_string())).collect();
            Ok(stream::iter(items).boxed())
        }
    }

    fn adapter(reply: Result<String, ModelError>, chunks: Vec<&'static str>) -> ModelAdapter {
        ModelAdapter::new(Arc::new(Canned { reply: Mutex::new(Some(reply)), chunks }))
    }

    fn prompt() -> RenderedPrompt {
        RenderedPrompt {
            task: Task::Classify,
            system: String::new(),
            text: "hi".into(),
            image: None,
            shape: Some("classification"),
        }
    }

    #[tokio::test]
    async fn invoke_types_fenced_reply() {
        let a = adapter(Ok("```json\n{\"category\":\"general_inquiry\",\"response\":\"hey\"}\n```".into()), vec![]);
        let c: Classification = a.invoke(&prompt(), &schema::CLASSIFICATION).await.unwrap();
        assert_eq!(c.advisory_response.as_deref(), Some("hey"));
    }

    #[tokio::test]
    async fn invoke_reports_malformed_with_raw_text() {
        let a = adapter(Ok("not json".into()), vec![]);
        let err = a.invoke::<Classification>(&prompt(), &schema::CLASSIFICATION).await.unwrap_err();
        assert_eq!(err.raw_output(), Some("not json"));
    }

    #[tokio::test]
    async fn invoke_reports_schema_violation() {
        let a = adapter(Ok(r#"{"category":"banter"}"#.into()), vec![]);
        let err = a.invoke::<Classification>(&prompt(), &schema::CLASSIFICATION).await.unwrap_err();
        assert!(matches!(err, ModelError::Schema(ref v) if v.field == "category"));
    }

    #[tokio::test]
    async fn blank_reply_is_empty_output() {
        let a = adapter(Ok("   \n".into()), vec![]);
        assert!(matches!(a.invoke_raw(&prompt()).await, Err(ModelError::EmptyOutput)));
    }

    #[tokio::test]
    async fn silent_stream_yields_empty_output() {
        let a = adapter(Ok(String::new()), vec![]);
        let out: Vec<_> = a.invoke_streaming(&prompt()).await.unwrap().collect().await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(ModelError::EmptyOutput)));
    }

    #[tokio::test]
    async fn stream_passes_chunks_in_order() {
        let a = adapter(Ok(String::new()), vec!["<html>", "<body>", "</body></html>"]);
        let out: Vec<String> = a
            .invoke_streaming(&prompt())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(out.concat(), "<html><body></body></html>");
    }

    #[tokio::test]
    async fn streamed_call_is_transcribed_when_it_ends() {
        let tmp = tempfile::tempdir().unwrap();
        let t = Transcript::new(tmp.path(), uuid::Uuid::new_v4());
        let a = adapter(Ok(String::new()), vec!["<html>", "</html>"]).with_transcript(t.clone());

        let mut s = a.invoke_streaming(&prompt()).await.unwrap();
        assert!(t.dir().join("00-classify.request.json").is_file());
        assert!(!t.dir().join("00-classify.response.json").exists());

        while s.next().await.is_some() {}
        let response = std::fs::read_to_string(t.dir().join("00-classify.response.json")).unwrap();
        assert!(response.contains("<html></html>"));
    }
}
