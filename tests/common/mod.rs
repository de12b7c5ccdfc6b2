#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use vibe_sitegen::errors::ModelError;
use vibe_sitegen::model::ModelAdapter;
use vibe_sitegen::orchestrator::Orchestrator;
use vibe_sitegen::provider::{ChunkStream, Provider};
use vibe_sitegen::wire::{RenderedPrompt, Task};

/// Provider that answers from per-task queues and remembers every prompt.
#[derive(Default)]
pub struct Scripted {
    replies: Mutex<HashMap<Task, VecDeque<Result<String, ModelError>>>>,
    chunks: Mutex<Vec<Result<String, ModelError>>>,
    pub seen: Mutex<Vec<RenderedPrompt>>,
}

impl Scripted {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(self: &Arc<Self>, task: Task, reply: Result<&str, ModelError>) -> Arc<Self> {
        self.replies
            .lock()
            .entry(task)
            .or_default()
            .push_back(reply.map(str::to_string));
        Arc::clone(self)
    }

    pub fn stream_chunks(self: &Arc<Self>, chunks: Vec<Result<&str, ModelError>>) -> Arc<Self> {
        *self.chunks.lock() = chunks.into_iter().map(|c| c.map(str::to_string)).collect();
        Arc::clone(self)
    }

    pub fn tasks_seen(&self) -> Vec<Task> {
        self.seen.lock().iter().map(|p| p.task).collect()
    }
}

#[async_trait]
impl Provider for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, ModelError> {
        self.seen.lock().push(prompt.clone());
        self.replies
            .lock()
            .get_mut(&prompt.task)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(ModelError::unavailable(format!("no scripted reply for {}", prompt.task))))
    }

    async fn stream(&self, prompt: &RenderedPrompt) -> Result<ChunkStream, ModelError> {
        self.seen.lock().push(prompt.clone());
        let chunks = std::mem::take(&mut *self.chunks.lock());
        Ok(stream::iter(chunks).boxed())
    }
}

pub fn orchestrator(p: &Arc<Scripted>) -> Orchestrator {
    Orchestrator::new(ModelAdapter::new(p.clone()))
}

pub fn offline() -> ModelError {
    ModelError::unavailable("connection refused")
}
