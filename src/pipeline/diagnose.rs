use crate::errors::ModelError;
use crate::model::ModelAdapter;
use crate::prompt::{self, Variables};
use crate::schema;
use crate::wire::{DiagnosisResult, Task, Utterance};

/// Advisory answers to change requests. Never touches source files, and
/// failures come back as they are: there is nothing to repair in free text.
#[derive(Clone)]
pub struct ChangeDiagnoser {
    model: ModelAdapter,
}

impl ChangeDiagnoser {
    pub fn new(model: ModelAdapter) -> Self {
        Self { model }
    }

    pub async fn diagnose(&self, utterance: &Utterance) -> Result<DiagnosisResult, ModelError> {
        let vars = Variables::new()
            .text("text", utterance.text.as_str())
            .image("image", utterance.image.as_ref());
        let rendered = prompt::render(Task::Diagnose, &vars)?;
        let d: DiagnosisResult = self.model.invoke(&rendered, &schema::DIAGNOSIS).await?;
        if d.advisory_text.trim().is_empty() {
            return Err(ModelError::EmptyOutput);
        }
        Ok(d)
    }
}
