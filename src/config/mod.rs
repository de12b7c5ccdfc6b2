use anyhow::{Context, Result};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::ProviderKind;
use crate::wire::GenerationLayout;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: String,
    pub provider: ProviderKind,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub openai_url: String,
    pub openai_key_env: String,
    pub anthropic_url: String,
    pub anthropic_version: String,
    pub anthropic_key_env: String,
    pub ollama_url: Option<String>,
    /// Layout used by `generate --structured` when none is given.
    pub layout: GenerationLayout,
    pub transcript_dir: String,
    pub save_transcripts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: "2025-10-01".into(),
            provider: ProviderKind::OpenAI,
            model: "gpt-4.1-mini".into(),
            timeout_secs: 240,
            max_tokens: 8192,
            openai_url: "https://api.openai.com".into(),
            openai_key_env: "OPENAI_API_KEY".into(),
            anthropic_url: "https://api.anthropic.com".into(),
            anthropic_version: "2023-06-01".into(),
            anthropic_key_env: "ANTHROPIC_API_KEY".into(),
            ollama_url: Some("http://localhost:11434".into()),
            layout: GenerationLayout::Document,
            transcript_dir: ".sitegen".into(),
            save_transcripts: false,
        }
    }
}

impl Config {
    /// Reads a TOML file; keys it leaves out keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
    }
}
