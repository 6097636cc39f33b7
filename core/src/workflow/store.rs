use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::workflow::types::Workflow;

/// Durable per-name workflow records.
pub trait WorkflowStore: Send + Sync {
    /// Overwrite the record for `workflow.name`.
    fn save(&self, workflow: &Workflow) -> Result<()>;

    fn load(&self, name: &str) -> Result<Option<Workflow>>;

    /// `Ok(false)` when there was no record.
    fn delete(&self, name: &str) -> Result<bool>;

    fn list_names(&self) -> Result<Vec<String>>;
}

/// Names become file names; keep them to a single path component.
pub fn validate_workflow_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("workflow name must not be empty");
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.starts_with('.') {
        bail!("workflow name '{name}' must not contain path separators");
    }
    Ok(())
}

/// One pretty-printed JSON file per workflow: `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Store rooted at `root`, creating the directory if needed.
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root)
                .with_context(|| format!("Failed to create workflow directory: {:?}", root))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<name>.json`; rejects names that could escape the root.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_workflow_name(name)?;
        Ok(self.root.join(format!("{name}.json")))
    }
}

impl WorkflowStore for JsonFileStore {
    fn save(&self, workflow: &Workflow) -> Result<()> {
        let path = self.path_for(&workflow.name)?;
        let json = serde_json::to_string_pretty(workflow).context("Failed to serialize workflow")?;

        // Write-then-rename so a crash never leaves a truncated record.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write workflow to {:?}", tmp))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move workflow into place at {:?}", path))
    }

    fn load(&self, name: &str) -> Result<Option<Workflow>> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read workflow from {:?}", path))?;
        let workflow = serde_json::from_str(&json)
            .with_context(|| format!("Failed to deserialize workflow {:?}", path))?;
        Ok(Some(workflow))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("Failed to delete workflow {:?}", path))?;
        Ok(true)
    }

    fn list_names(&self) -> Result<Vec<String>> {
        let pattern = self.root.join("*.json");
        let pattern = pattern.to_string_lossy();
        let mut names = Vec::new();
        for entry in glob::glob(&pattern).context("Invalid workflow glob pattern")? {
            let path = entry.context("Failed to read workflow directory entry")?;
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
