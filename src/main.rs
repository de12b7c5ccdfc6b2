use anyhow::{anyhow, Context, Result};
use clap::Parser;
use fs_err as fs;
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use vibe_sitegen::cli::{self, Command, Message};
use vibe_sitegen::config::Config;
use vibe_sitegen::log::{self, Transcript};
use vibe_sitegen::model::{repair, ModelAdapter};
use vibe_sitegen::orchestrator::Orchestrator;
use vibe_sitegen::preview;
use vibe_sitegen::provider;
use vibe_sitegen::sandbox::{Capabilities, SandboxHost};
use vibe_sitegen::store::{DirStore, ProjectStore};
use vibe_sitegen::wire::{GenerationLayout, GenerationRequest, GenerationResult, ImageData, Project};

mod ux;

fn load_config(args: &cli::Args) -> Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(p) = args.provider {
        cfg.provider = p;
    }
    if let Some(m) = &args.model {
        cfg.model = m.clone();
    }
    if let Some(t) = args.timeout_secs {
        cfg.timeout_secs = t;
    }
    cfg.save_transcripts |= args.save_transcripts;
    Ok(cfg)
}

fn read_image(arg: Option<&str>) -> Result<Option<ImageData>> {
    let Some(arg) = arg else { return Ok(None) };
    if arg.trim_start().starts_with("data:") {
        return ImageData::from_data_uri(arg).map(Some).map_err(|e| anyhow!(e));
    }
    let bytes = fs::read(arg)?;
    ImageData::from_file_bytes(arg, &bytes).map(Some).map_err(|e| anyhow!(e))
}

fn build_orchestrator(cfg: &Config) -> Result<Orchestrator> {
    let txid = Uuid::new_v4();
    let mut model = ModelAdapter::new(provider::make_provider(cfg)?);
    if cfg.save_transcripts {
        let t = Transcript::new(Path::new(&cfg.transcript_dir), txid);
        tracing::info!(dir = %t.dir().display(), "saving transcripts");
        model = model.with_transcript(t);
    }
    tracing::debug!(provider = model.provider_name(), model = %cfg.model, tx = %txid, "ready");
    Ok(Orchestrator::new(model))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    log::init_tracing(args.debug);
    let cfg = load_config(&args)?;

    match args.command {
        Command::Classify(Message { text, image }) => {
            let image = read_image(image.as_deref())?;
            let orch = build_orchestrator(&cfg)?;
            let pb = ux::spinner("Reading your message");
            let reply = orch.handle_categorization(&text, image).await;
            pb.finish_and_clear();
            ux::show_categorization(&reply?);
        }
        Command::Chat(Message { text, image }) => {
            let image = read_image(image.as_deref())?;
            let orch = build_orchestrator(&cfg)?;
            let pb = ux::spinner("Thinking");
            let reply = orch.handle_chat(&text, image).await;
            pb.finish_and_clear();
            ux::show_chat(&reply?);
        }
        Command::Generate { prompt, structured, out } => {
            let orch = build_orchestrator(&cfg)?;
            let req = GenerationRequest { prompt };
            match structured {
                None => generate_streamed(&orch, req, out.as_deref()).await?,
                Some(layout) => {
                    let layout = layout.unwrap_or(cfg.layout);
                    generate_structured(&orch, req, layout, out.as_deref()).await?
                }
            }
        }
        // Preview never talks to a backend.
        Command::Preview { dir, out, frame } => preview_dir(&dir, &out, frame)?,
    }
    Ok(())
}

async fn generate_streamed(orch: &Orchestrator, req: GenerationRequest, out: Option<&Path>) -> Result<()> {
    let pb = ux::spinner("Generating");
    let mut chunks = match orch.handle_generation(req).await {
        Ok(s) => s,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e.into());
        }
    };
    let mut stdout = tokio::io::stdout();
    let mut doc = String::new();
    while let Some(item) = chunks.next().await {
        match item {
            Ok(bytes) => {
                if out.is_none() {
                    if !pb.is_finished() {
                        pb.finish_and_clear();
                    }
                    stdout.write_all(&bytes).await?;
                    stdout.flush().await?;
                }
                doc.push_str(&String::from_utf8_lossy(&bytes));
            }
            Err(e) => {
                pb.finish_and_clear();
                return Err(e.into());
            }
        }
    }
    pb.finish_and_clear();
    match out {
        Some(path) => {
            let html = repair::strip_code_fence(&doc);
            fs::write(path, html)?;
            ux::show_written("document", &path.display().to_string(), html.len());
        }
        None => stdout.write_all(b"\n").await?,
    }
    Ok(())
}

async fn generate_structured(
    orch: &Orchestrator,
    req: GenerationRequest,
    layout: GenerationLayout,
    out: Option<&Path>,
) -> Result<()> {
    let pb = ux::spinner("Generating");
    let result = orch.handle_structured_generation(req, layout).await;
    pb.finish_and_clear();
    let result = result?;
    match (out, result) {
        (None, GenerationResult::Document { html }) => println!("{html}"),
        (None, r) => println!("{}", serde_json::to_string_pretty(&r)?),
        (Some(path), GenerationResult::Document { html }) if layout == GenerationLayout::Document => {
            fs::write(path, &html)?;
            ux::show_written("document", &path.display().to_string(), html.len());
        }
        (Some(dir), r) => {
            let files = r.into_files();
            DirStore::new(dir)
                .save(&Project::new(files.clone()))
                .with_context(|| format!("writing project to {}", dir.display()))?;
            ux::show_files(&files);
        }
    }
    Ok(())
}

fn preview_dir(dir: &Path, out: &Path, frame: bool) -> Result<()> {
    let project = DirStore::new(dir).load()?;
    let document = preview::compose(&project.files);
    let page = if frame {
        let host = SandboxHost::new();
        let ctx = host.create(document, Capabilities::default());
        ctx.host_page()
    } else {
        document
    };
    fs::write(out, &page)?;
    ux::show_written("preview", &out.display().to_string(), page.len());
    Ok(())
}
