//! Boundary operations.
//!
//! The orchestrator picks the pipeline stages for each call and converts
//! every internal failure into a [`BoundaryError`]. No other error type leaves
//! this module.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::errors::{BoundaryError, ModelError};
use crate::model::ModelAdapter;
use crate::pipeline::{ChangeDiagnoser, IntentClassifier, WebsiteGenerator};
use crate::wire::{Category, GenerationLayout, GenerationRequest, GenerationResult, ImageData, Utterance};

/// Returned to the user when classification cannot be done.
pub const APOLOGY: &str =
    "Sorry, I couldn't process that message right now. Please try again in a moment, or describe the website you'd like me to build.";

/// Generated bytes in arrival order; a failure mid-stream is the last item.
pub type GenerationStream = BoxStream<'static, Result<Bytes, BoundaryError>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

/// Exactly one of `prompt` / `response` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizationReply {
    pub category: Category,
    pub prompt: String,
    pub response: String,
}

fn user_message(e: &ModelError) -> String {
    match e {
        ModelError::Unavailable(_) => "The AI service is unavailable right now. Please try again.".into(),
        ModelError::EmptyOutput => "The AI service returned an empty answer. Please try again.".into(),
        ModelError::Malformed { .. } | ModelError::Schema(_) => {
            "The AI service returned an answer that could not be understood. Please try again.".into()
        }
        ModelError::Prompt(_) => "Your request could not be prepared. Please try again.".into(),
    }
}

fn to_boundary(op: &'static str, e: ModelError) -> BoundaryError {
    tracing::error!(op, error = %e, "request failed");
    BoundaryError::new(user_message(&e))
}

fn utterance(text: &str, image: Option<ImageData>) -> Utterance {
    Utterance {
        text: text.to_string(),
        image,
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    classifier: IntentClassifier,
    generator: WebsiteGenerator,
    diagnoser: ChangeDiagnoser,
}

impl Orchestrator {
    pub fn new(model: ModelAdapter) -> Self {
        Self {
            classifier: IntentClassifier::new(model.clone()),
            generator: WebsiteGenerator::new(model.clone()),
            diagnoser: ChangeDiagnoser::new(model),
        }
    }

    /// Stream a single HTML document for `req.prompt`. Chunks are forwarded
    /// as they arrive; dropping the stream stops consuming the backend.
    pub async fn handle_generation(&self, req: GenerationRequest) -> Result<GenerationStream, BoundaryError> {
        if req.prompt.trim().is_empty() {
            return Err(BoundaryError::new("Please describe the website you want to build."));
        }
        let chunks = self
            .generator
            .generate_stream(&req.prompt)
            .await
            .map_err(|e| to_boundary("generation", e))?;
        Ok(chunks
            .map(|item| item.map(Bytes::from).map_err(|e| to_boundary("generation", e)))
            .boxed())
    }

    /// Structured generation; malformed model output has already been turned
    /// into a fallback document by the generator.
    pub async fn handle_structured_generation(
        &self,
        req: GenerationRequest,
        layout: GenerationLayout,
    ) -> Result<GenerationResult, BoundaryError> {
        if req.prompt.trim().is_empty() {
            return Err(BoundaryError::new("Please describe the website you want to build."));
        }
        self.generator
            .generate_structured(&req.prompt, layout)
            .await
            .map_err(|e| to_boundary("structured_generation", e))
    }

    pub async fn handle_chat(&self, text: &str, image: Option<ImageData>) -> Result<ChatReply, BoundaryError> {
        let d = self
            .diagnoser
            .diagnose(&utterance(text, image))
            .await
            .map_err(|e| to_boundary("chat", e))?;
        Ok(ChatReply { response: d.advisory_text })
    }

    /// Classify, then diagnose general inquiries. Classification failures
    /// degrade to a general inquiry answered with [`APOLOGY`]; a failed
    /// diagnosis falls back to the classifier's own reply, then the apology.
    pub async fn handle_categorization(
        &self,
        text: &str,
        image: Option<ImageData>,
    ) -> Result<CategorizationReply, BoundaryError> {
        let u = utterance(text, image);
        let c = match self.classifier.classify(&u).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "classification failed, answering with apology");
                return Ok(CategorizationReply {
                    category: Category::GeneralInquiry,
                    prompt: String::new(),
                    response: APOLOGY.to_string(),
                });
            }
        };

        match c.category {
            Category::CodeRequest if c.extracted_prompt.as_deref().is_some_and(|p| !p.is_empty()) => Ok(CategorizationReply {
                category: Category::CodeRequest,
                prompt: c.extracted_prompt.unwrap_or_default(),
                response: String::new(),
            }),
            // A build request with nothing to build is answered instead.
            Category::CodeRequest | Category::GeneralInquiry => {
                let response = match self.diagnoser.diagnose(&u).await {
                    Ok(d) => d.advisory_text,
                    Err(e) => {
                        tracing::warn!(error = %e, "diagnosis failed, using classifier reply");
                        c.advisory_response.unwrap_or_else(|| APOLOGY.to_string())
                    }
                };
                Ok(CategorizationReply {
                    category: Category::GeneralInquiry,
                    prompt: String::new(),
                    response,
                })
            }
        }
    }
}
