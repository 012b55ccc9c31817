use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use sitesmith_core::types::TaskId;

/// Primary file of every generated site.
pub const INDEX_FILE: &str = "index.html";

/// Result of an artifact operation. Domain failures are values, never errors.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<usize>,
}

impl FileOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            content: None,
            occurrences: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            content: None,
            occurrences: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Human-readable summary: the error on failure, the message on success.
    pub fn summary(&self) -> &str {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or_default()
    }
}

/// Directory-backed artifact store. Every file lives under `<root>/<task_id>/`.
///
/// Writes to the same path are serialized inside one process; there is no
/// cross-process locking.
pub struct SiteStore {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl SiteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `(task, path)` to a file under the root, rejecting escapes.
    pub fn resolve(&self, task: &TaskId, path: &str) -> Result<PathBuf, String> {
        check_relative(task.as_str()).map_err(|e| format!("Invalid site_id: {e}"))?;
        check_relative(path).map_err(|e| format!("Invalid file_path: {e}"))?;
        Ok(self.root.join(task.as_str()).join(path))
    }

    pub async fn exists(&self, task: &TaskId, path: &str) -> bool {
        match self.resolve(task, path) {
            Ok(p) => tokio::fs::try_exists(&p).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Create a new file. Fails if it already exists or `content` is absent.
    pub async fn create(&self, task: &TaskId, path: &str, content: Option<&str>) -> FileOutcome {
        let Some(content) = content else {
            return FileOutcome::failed("content parameter is required for create_file operation");
        };
        let file = match self.resolve(task, path) {
            Ok(p) => p,
            Err(e) => return FileOutcome::failed(e),
        };
        let guard = self.lock(&file).await;
        let outcome = write_new(&file, path, content).await;
        drop(guard);
        self.release(&file);

        if outcome.success {
            debug!(task_id = %task, path, bytes = content.len(), "Created file");
        }
        outcome
    }

    /// Replace every occurrence of `old` with `new`.
    pub async fn edit(&self, task: &TaskId, path: &str, old: &str, new: &str) -> FileOutcome {
        if old.is_empty() {
            return FileOutcome::failed("old_string must not be empty");
        }
        let file = match self.resolve(task, path) {
            Ok(p) => p,
            Err(e) => return FileOutcome::failed(e),
        };
        let guard = self.lock(&file).await;
        let outcome = replace_in(&file, path, old, new).await;
        drop(guard);
        self.release(&file);

        if let Some(count) = outcome.occurrences {
            debug!(task_id = %task, path, count, "Edited file");
        }
        outcome
    }

    pub async fn read(&self, task: &TaskId, path: &str) -> FileOutcome {
        let file = match self.resolve(task, path) {
            Ok(p) => p,
            Err(e) => return FileOutcome::failed(e),
        };

        match tokio::fs::read_to_string(&file).await {
            Ok(content) => FileOutcome {
                content: Some(content.clone()),
                ..FileOutcome::ok(format!("Read {} characters from '{}'", content.chars().count(), path))
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                FileOutcome::failed(format!("File not found: {}", path))
            }
            Err(e) => FileOutcome::failed(format!("{}: {e}", path)),
        }
    }

    pub async fn delete(&self, task: &TaskId, path: &str) -> FileOutcome {
        let file = match self.resolve(task, path) {
            Ok(p) => p,
            Err(e) => return FileOutcome::failed(e),
        };
        let guard = self.lock(&file).await;

        let outcome = match tokio::fs::remove_file(&file).await {
            Ok(()) => FileOutcome::ok(format!("File '{}' deleted successfully", path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                FileOutcome::failed(format!("File not found: {}", path))
            }
            Err(e) => FileOutcome::failed(format!("{}: {e}", path)),
        };

        drop(guard);
        self.release(&file);
        outcome
    }

    /// Read a file, returning `None` when missing or unreadable.
    pub async fn read_to_string(&self, task: &TaskId, path: &str) -> Option<String> {
        self.read(task, path).await.content
    }

    async fn lock(&self, file: &Path) -> tokio::sync::OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(file.to_path_buf()).or_default().clone()
        };
        entry.lock_owned().await
    }

    /// Drop the lock entry for a path nobody else is holding.
    fn release(&self, file: &Path) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(file).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(file);
        }
    }
}

async fn write_new(file: &Path, path: &str, content: &str) -> FileOutcome {
    if tokio::fs::try_exists(file).await.unwrap_or(false) {
        return FileOutcome::failed(format!("File already exists: {}", path))
            .with_message("Use edit_file operation to modify existing files");
    }
    if let Some(parent) = file.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return FileOutcome::failed(format!("Failed to create directories: {e}"));
        }
    }
    match tokio::fs::write(file, content).await {
        Ok(()) => FileOutcome::ok(format!("File '{}' created successfully", path)),
        Err(e) => FileOutcome::failed(format!("{}: {e}", path)),
    }
}

async fn replace_in(file: &Path, path: &str, old: &str, new: &str) -> FileOutcome {
    let current = match tokio::fs::read_to_string(file).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return FileOutcome::failed(format!("File not found: {}", path));
        }
        Err(e) => return FileOutcome::failed(format!("{}: {e}", path)),
    };

    let count = current.matches(old).count();
    if count == 0 {
        return FileOutcome::failed("old_string not found in file").with_message("No replacements made");
    }
    if let Err(e) = tokio::fs::write(file, current.replace(old, new)).await {
        return FileOutcome::failed(format!("{}: {e}", path));
    }
    FileOutcome {
        occurrences: Some(count),
        ..FileOutcome::ok(format!("Replaced {} occurrence(s) in '{}'", count, path))
    }
}

fn check_relative(path: &str) -> Result<(), &'static str> {
    if path.trim().is_empty() {
        return Err("must not be empty");
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return Err("must be relative");
    }
    for component in p.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err("must not leave the site directory"),
        }
    }
    Ok(())
}
