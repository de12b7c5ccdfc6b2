use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::GenerationLayout;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(alias = "openai")]
    OpenAI,
    #[value(alias = "anthropic")]
    Anthropic,
    #[value(alias = "ollama")]
    Ollama,
}

#[derive(Parser, Debug)]
#[command(name = "vibe_sitegen", version, about = "Chat-driven website generator with a sandboxed preview")]
pub struct Args {
    /// TOML config file; flags below override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, global = true)]
    pub provider: Option<ProviderKind>,

    #[arg(long, global = true)]
    pub model: Option<String>,

    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Save every backend request/response under the transcript dir.
    #[arg(long, default_value_t = false, global = true)]
    pub save_transcripts: bool,

    #[arg(long, default_value_t = false, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug)]
pub struct Message {
    /// What the user typed.
    pub text: String,

    /// Image file or `data:image/...;base64,` URI to attach.
    #[arg(long)]
    pub image: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decide whether a message asks to build something, and answer it if not.
    Classify(Message),

    /// Advisory answer to a change request; no files are touched.
    Chat(Message),

    /// Generate a website from a prompt.
    Generate {
        prompt: String,

        /// Ask for structured output instead of a streamed document. Without
        /// a value the config's `layout` is used.
        #[arg(long, value_enum, num_args = 0..=1)]
        structured: Option<Option<GenerationLayout>>,

        /// Write the result here (a file, or a directory for file sets).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Compose a project directory into one previewable page.
    Preview {
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        #[arg(long, default_value = "preview.html")]
        out: PathBuf,

        /// Write a host page that runs the document in a sandboxed frame.
        #[arg(long, default_value_t = false)]
        frame: bool,
    },
}
