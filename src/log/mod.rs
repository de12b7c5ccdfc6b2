use chrono::Utc;
use fs_err as fs;
use serde_json::{json, to_string_pretty};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::errors::ModelError;
use crate::wire::RenderedPrompt;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over `debug`.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn tx_dir(root: &Path, tx: Uuid) -> PathBuf {
    root.join("tx").join(tx.to_string())
}

/// Per-transaction record of model exchanges, one request/response file
/// pair per call.
#[derive(Debug, Clone)]
pub struct Transcript {
    dir: PathBuf,
    seq: Arc<AtomicUsize>,
}

impl Transcript {
    pub fn new(root: &Path, tx: Uuid) -> Self {
        Self {
            dir: tx_dir(root, tx),
            seq: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Best effort: failures are logged, never returned.
    pub fn record(&self, prompt: &RenderedPrompt, result: &Result<String, ModelError>) {
        let stage = self.record_request(prompt);
        self.record_response(&stage, result.as_deref());
    }

    /// Write the request half of a new stage and return the stage name.
    pub fn record_request(&self, prompt: &RenderedPrompt) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let stage = format!("{n:02}-{}", prompt.task);
        if let Err(e) = self.write_request(&stage, prompt) {
            tracing::warn!(stage, error = %e, "could not save transcript request");
        }
        stage
    }

    pub fn record_response(&self, stage: &str, result: Result<&str, &ModelError>) {
        if let Err(e) = self.write_response(stage, result) {
            tracing::warn!(stage, error = %e, "could not save transcript response");
        }
    }

    fn write_request(&self, stage: &str, prompt: &RenderedPrompt) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(format!("{stage}.request.json")), to_string_pretty(prompt)?)?;
        Ok(())
    }

    fn write_response(&self, stage: &str, result: Result<&str, &ModelError>) -> anyhow::Result<()> {
        let response = match result {
            Ok(raw) => json!({ "at": Utc::now(), "raw": raw }),
            Err(e) => json!({ "at": Utc::now(), "error": e.to_string() }),
        };
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(format!("{stage}.response.json")), to_string_pretty(&response)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Task;

    #[test]
    fn records_numbered_stage_files() {
        let tmp = tempfile::tempdir().unwrap();
        let t = Transcript::new(tmp.path(), Uuid::new_v4());
        let prompt = RenderedPrompt {
            task: Task::Diagnose,
            system: "s".into(),
            text: "t".into(),
            image: None,
            shape: Some("diagnosis"),
        };
        t.record(&prompt, &Ok("{\"response\":\"ok\"}".into()));
        t.record(&prompt, &Err(ModelError::EmptyOutput));

        assert!(t.dir().join("00-diagnose.request.json").is_file());
        let second = std::fs::read_to_string(t.dir().join("01-diagnose.response.json")).unwrap();
        assert!(second.contains("empty output"));
    }
}
