use crate::errors::ModelError;
use crate::model::ModelAdapter;
use crate::prompt::{self, Variables};
use crate::schema;
use crate::wire::{Category, Classification, Task, Utterance};

/// Decides whether an utterance asks for a website or is a general question.
#[derive(Clone)]
pub struct IntentClassifier {
    model: ModelAdapter,
}

impl IntentClassifier {
    pub fn new(model: ModelAdapter) -> Self {
        Self { model }
    }

    /// The model's category is taken as is; the reply is only normalized so
    /// that a build request always carries a prompt and a general inquiry
    /// never does.
    pub async fn classify(&self, utterance: &Utterance) -> Result<Classification, ModelError> {
        let vars = Variables::new()
            .text("text", utterance.text.as_str())
            .image("image", utterance.image.as_ref());
        let rendered = prompt::render(Task::Classify, &vars)?;
        let raw: Classification = self.model.invoke(&rendered, &schema::CLASSIFICATION).await?;
        let c = normalize(raw, utterance);
        tracing::info!(category = %c.category, "classified utterance");
        Ok(c)
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn normalize(c: Classification, utterance: &Utterance) -> Classification {
    match c.category {
        Category::CodeRequest => {
            let prompt = non_blank(c.extracted_prompt).unwrap_or_else(|| utterance.text.trim().to_string());
            Classification::code_request(prompt)
        }
        Category::GeneralInquiry => Classification::general_inquiry(non_blank(c.advisory_response)),
    }
}
