//! The model-backed stages: intent classification, website generation and
//! change diagnosis. Each stage owns a [`ModelAdapter`](crate::model::ModelAdapter)
//! clone and renders its own prompt.

pub mod classify;
pub mod diagnose;
pub mod generate;

pub use classify::IntentClassifier;
pub use diagnose::ChangeDiagnoser;
pub use generate::WebsiteGenerator;
