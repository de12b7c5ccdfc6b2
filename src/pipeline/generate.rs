use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::errors::{ModelError, SchemaViolation};
use crate::model::{repair, ModelAdapter};
use crate::preview::escape_html;
use crate::prompt::{self, Variables};
use crate::provider::ChunkStream;
use crate::schema::{self, Shape};
use crate::wire::{GenerationLayout, GenerationResult, SourceFile, SourceKind, Task};

/// Turns a build prompt into website source.
#[derive(Clone)]
pub struct WebsiteGenerator {
    model: ModelAdapter,
}

impl WebsiteGenerator {
    pub fn new(model: ModelAdapter) -> Self {
        Self { model }
    }

    /// Single-document mode: raw HTML text as it streams in, unvalidated.
    pub async fn generate_stream(&self, prompt: &str) -> Result<ChunkStream, ModelError> {
        let rendered = prompt::render(Task::GenerateDocument, &Variables::new().text("prompt", prompt))?;
        self.model.invoke_streaming(&rendered).await
    }

    /// Structured mode. Backend failures propagate; anything the model says
    /// that cannot be read as the requested layout becomes a fallback
    /// document showing the raw reply.
    pub async fn generate_structured(&self, prompt: &str, layout: GenerationLayout) -> Result<GenerationResult, ModelError> {
        let task = match layout {
            GenerationLayout::Document => Task::GenerateStructured,
            GenerationLayout::Files => Task::GenerateFiles,
        };
        let rendered = prompt::render(task, &Variables::new().text("prompt", prompt))?;
        let raw = self.model.invoke_raw(&rendered).await?;
        match parse_structured(&raw, layout) {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(error = %e, "structured output unusable, returning fallback document");
                Ok(fallback_document(&raw, &e.to_string()))
            }
        }
    }
}

fn layout_shape(layout: GenerationLayout) -> &'static Shape {
    match layout {
        GenerationLayout::Document => &schema::DOCUMENT,
        GenerationLayout::Files => &schema::FILE_SET,
    }
}

/// Repair step: drop a code fence, parse, validate.
pub fn parse_structured(raw: &str, layout: GenerationLayout) -> Result<GenerationResult, ModelError> {
    let value = repair::parse_json(raw).map_err(|reason| ModelError::Malformed {
        reason,
        raw: raw.to_string(),
    })?;
    let result: GenerationResult = schema::validate(layout_shape(layout), value)?;
    match result {
        GenerationResult::Files { files } => {
            let files = files.into_iter().map(with_language).collect::<Vec<_>>();
            check_file_set(&files)?;
            Ok(GenerationResult::Files { files })
        }
        doc => Ok(doc),
    }
}

fn with_language(mut f: SourceFile) -> SourceFile {
    if f.language.trim().is_empty() {
        f.language = SourceFile::new(f.name.as_str(), "").language;
    }
    f
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<(?:script|link)\b[^>]*?\s(?:src|href)\s*=\s*["']([^"']+)["']"#).expect("valid reference regex")
    })
}

fn is_external(target: &str) -> bool {
    let t = target.to_ascii_lowercase();
    ["http:", "https:", "//", "data:", "blob:", "#", "mailto:", "javascript:"]
        .iter()
        .any(|p| t.starts_with(p))
}

/// Local style and script files referenced by a markup document.
pub fn local_references(markup: &str) -> Vec<String> {
    reference_re()
        .captures_iter(markup)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
        .filter(|t| !is_external(t))
        .map(|t| {
            let t = t.split(['?', '#']).next().unwrap_or(t);
            t.trim_start_matches("./").to_string()
        })
        .filter(|t| matches!(SourceKind::of(t), Some(SourceKind::Style | SourceKind::Script)))
        .collect()
}

/// A file set needs one markup file, unique names, and local references
/// that resolve inside the set.
pub fn check_file_set(files: &[SourceFile]) -> Result<(), SchemaViolation> {
    let violation = |field: String, reason: String| SchemaViolation {
        shape: schema::FILE_SET.name,
        field,
        reason,
    };
    let mut names = HashSet::new();
    for (i, f) in files.iter().enumerate() {
        if !names.insert(f.name.as_str()) {
            return Err(violation(format!("files[{i}].name"), format!("duplicates {:?}", f.name)));
        }
    }
    let markup: Vec<&SourceFile> = files.iter().filter(|f| f.kind() == Some(SourceKind::Markup)).collect();
    if markup.is_empty() {
        return Err(violation("files".into(), "contains no markup file".into()));
    }
    for m in markup {
        for target in local_references(&m.content) {
            if !names.contains(target.as_str()) {
                return Err(violation(
                    "files".into(),
                    format!("{} references missing file {target:?}", m.name),
                ));
            }
        }
    }
    Ok(())
}

/// Minimal document with a visible panel holding the raw model reply.
///
/// The reply is HTML-escaped, so it is verbatim as rendered text; markup in
/// it shows up as characters and the raw bytes are not a substring of `html`.
pub fn fallback_document(raw: &str, reason: &str) -> GenerationResult {
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Generation output could not be parsed</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 0; padding: 24px; background: #f8fafc; color: #0f172a; }}
.parse-error {{ border: 2px solid #dc2626; border-radius: 8px; background: #fef2f2; padding: 16px 20px; }}
.parse-error h1 {{ margin: 0 0 8px; font-size: 1.25rem; color: #b91c1c; }}
.parse-error pre {{ white-space: pre-wrap; word-break: break-word; background: #fff; border: 1px solid #fecaca; padding: 12px; overflow: auto; }}
</style>
</head>
<body>
<div class="parse-error" role="alert">
<h1>Parsing failed</h1>
<p>The model's reply could not be read as a website ({reason}). Its raw output is shown below.</p>
<pre>{raw}</pre>
</div>
</body>
</html>
"#,
        reason = escape_html(reason),
        raw = escape_html(raw),
    );
    GenerationResult::Document { html }
}
