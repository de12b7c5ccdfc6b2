use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ========================================
/// Pipeline data model
/// ========================================

/// Inline image attached to an utterance, kept as its `data:` URI parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageData {
    pub media_type: String,
    pub base64: String,
}

impl ImageData {
    pub fn from_data_uri(uri: &str) -> Result<Self, String> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| "image must be a data: URI".to_string())?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| "data URI has no payload".to_string())?;
        let media_type = meta
            .strip_suffix(";base64")
            .ok_or_else(|| "data URI must be base64 encoded".to_string())?;
        if !media_type.starts_with("image/") {
            return Err(format!("unsupported media type: {media_type}"));
        }
        if payload.is_empty() {
            return Err("data URI has no payload".into());
        }
        Ok(Self {
            media_type: media_type.to_string(),
            base64: payload.to_string(),
        })
    }

    /// Encode raw image bytes; the media type comes from the file extension.
    pub fn from_file_bytes(file_name: &str, bytes: &[u8]) -> Result<Self, String> {
        let ext = file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();
        let media_type = match ext.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            other => return Err(format!("unsupported image type: {other:?}")),
        };
        if bytes.is_empty() {
            return Err(format!("{file_name} is empty"));
        }
        Ok(Self {
            media_type: media_type.to_string(),
            base64: BASE64.encode(bytes),
        })
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64)
    }
}

impl TryFrom<String> for ImageData {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        ImageData::from_data_uri(&s)
    }
}

impl From<ImageData> for String {
    fn from(img: ImageData) -> Self {
        img.data_uri()
    }
}

/// One user message submitted to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageData>,
}

impl Utterance {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), image: None }
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[serde(alias = "build_request")]
    CodeRequest,
    GeneralInquiry,
}

impl Category {
    pub const WIRE_NAMES: &'static [&'static str] = &["code_request", "build_request", "general_inquiry"];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::CodeRequest => f.write_str("code_request"),
            Category::GeneralInquiry => f.write_str("general_inquiry"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    #[serde(default, rename = "prompt", alias = "extractedPrompt", skip_serializing_if = "Option::is_none")]
    pub extracted_prompt: Option<String>,
    #[serde(default, rename = "response", alias = "advisoryResponse", skip_serializing_if = "Option::is_none")]
    pub advisory_response: Option<String>,
}

impl Classification {
    pub fn code_request(prompt: impl Into<String>) -> Self {
        Self {
            category: Category::CodeRequest,
            extracted_prompt: Some(prompt.into()),
            advisory_response: None,
        }
    }

    pub fn general_inquiry(response: Option<String>) -> Self {
        Self {
            category: Category::GeneralInquiry,
            extracted_prompt: None,
            advisory_response: response,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
}

/// How structured generation lays out its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GenerationLayout {
    /// One `{ "html": ... }` envelope.
    #[default]
    Document,
    /// `{ "files": [...] }` with markup, style and script files.
    Files,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationResult {
    Document { html: String },
    Files { files: Vec<SourceFile> },
}

impl GenerationResult {
    /// Every result as a previewable file set.
    pub fn into_files(self) -> Vec<SourceFile> {
        match self {
            GenerationResult::Document { html } => vec![SourceFile::new("index.html", html)],
            GenerationResult::Files { files } => files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    #[serde(rename = "response", alias = "advisoryText")]
    pub advisory_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Markup,
    Style,
    Script,
}

impl SourceKind {
    /// Classify a file name by suffix.
    pub fn of(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".html") || lower.ends_with(".htm") {
            Some(SourceKind::Markup)
        } else if lower.ends_with(".css") {
            Some(SourceKind::Style)
        } else if lower.ends_with(".js") || lower.ends_with(".mjs") {
            Some(SourceKind::Script)
        } else {
            None
        }
    }

    pub fn language(self) -> &'static str {
        match self {
            SourceKind::Markup => "html",
            SourceKind::Style => "css",
            SourceKind::Script => "javascript",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    #[serde(default)]
    pub language: String,
    pub content: String,
}

impl SourceFile {
    /// Builds a file, deriving the language tag from the name.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        let language = SourceKind::of(&name)
            .map(|k| k.language().to_string())
            .unwrap_or_else(|| "plaintext".into());
        Self { name, language, content: content.into() }
    }

    pub fn kind(&self) -> Option<SourceKind> {
        SourceKind::of(&self.name)
    }
}

/// Snapshot of the named files the editing surface owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub files: Vec<SourceFile>,
}

impl Project {
    pub fn new(files: Vec<SourceFile>) -> Self {
        Self { files }
    }

    pub fn file(&self, name: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Replaces the content of `name`, or appends a new file.
    pub fn update_file(&mut self, name: &str, content: impl Into<String>) {
        let content = content.into();
        match self.files.iter_mut().find(|f| f.name == name) {
            Some(f) => f.content = content,
            None => self.files.push(SourceFile::new(name, content)),
        }
    }
}

/// ========================================
/// Backend wire contract
/// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Classify,
    GenerateDocument,
    GenerateStructured,
    GenerateFiles,
    Diagnose,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Task::Classify => "classify",
            Task::GenerateDocument => "generate_document",
            Task::GenerateStructured => "generate_structured",
            Task::GenerateFiles => "generate_files",
            Task::Diagnose => "diagnose",
        };
        f.write_str(s)
    }
}

/// What the model adapter sends to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPrompt {
    pub task: Task,
    pub system: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageData>,
    /// Expected output shape name for blocking calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<&'static str>,
}
