//! Where project snapshots live between runs.

use anyhow::{Context, Result};
use fs_err as fs;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::wire::{Project, SourceFile, SourceKind};

/// Loads and saves a whole project at once.
pub trait ProjectStore: Send + Sync {
    fn load(&self) -> Result<Project>;
    fn save(&self, project: &Project) -> Result<()>;
}

/// Project files on disk under `root`. Only markup, style and script files
/// are picked up; hidden directories are skipped.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(|n| n.starts_with('.'))
}

impl ProjectStore for DirStore {
    fn load(&self) -> Result<Project> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root)
            .max_depth(5)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry.with_context(|| format!("walking {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root)?;
            let name = rel.to_string_lossy().replace('\\', "/");
            if SourceKind::of(&name).is_none() {
                continue;
            }
            let content = fs::read_to_string(entry.path())?;
            files.push(SourceFile::new(name, content));
        }
        tracing::debug!(root = %self.root.display(), files = files.len(), "loaded project");
        Ok(Project::new(files))
    }

    fn save(&self, project: &Project) -> Result<()> {
        for f in &project.files {
            if Path::new(&f.name).components().any(|c| !matches!(c, std::path::Component::Normal(_))) {
                anyhow::bail!("refusing to write outside the project: {}", f.name);
            }
            let path = self.root.join(&f.name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &f.content)?;
        }
        tracing::debug!(root = %self.root.display(), files = project.files.len(), "saved project");
        Ok(())
    }
}

/// In-process store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    project: Mutex<Project>,
}

impl MemoryStore {
    pub fn new(project: Project) -> Self {
        Self {
            project: Mutex::new(project),
        }
    }
}

impl ProjectStore for MemoryStore {
    fn load(&self) -> Result<Project> {
        Ok(self.project.lock().clone())
    }

    fn save(&self, project: &Project) -> Result<()> {
        *self.project.lock() = project.clone();
        Ok(())
    }
}
