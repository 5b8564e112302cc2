//! Sandboxed filesystem handler for ACP `fs/*` requests.
//!
//! An external agent may only touch files under the workspace root
//! registered for its session. Every path is resolved against that root
//! and rejected with a structured invalid-params error when it escapes —
//! before any I/O happens. Reads honor a 1-based line offset/limit and a
//! maximum-file-size cap; writes create parent directories and notify a
//! registered file-change observer.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{FemtoError, Result};

/// Default cap on readable file size (10 MiB).
const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Published after every successful write so an external watcher (UI,
/// indexer) can refresh. Fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub struct FileChangeNotice {
    /// Session whose agent performed the write
    pub session_id: String,
    /// Absolute path of the written file
    pub path: PathBuf,
}

/// Serves `fs/read_text_file` and `fs/write_text_file` for ACP sessions.
pub struct AcpFsHandler {
    roots: Mutex<HashMap<String, PathBuf>>,
    max_file_size: u64,
    observer: Mutex<Option<mpsc::Sender<FileChangeNotice>>>,
}

impl AcpFsHandler {
    /// Create a handler with the default file-size cap.
    pub fn new() -> Self {
        Self::with_max_file_size(DEFAULT_MAX_FILE_SIZE)
    }

    /// Create a handler with a custom file-size cap in bytes.
    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self {
            roots: Mutex::new(HashMap::new()),
            max_file_size,
            observer: Mutex::new(None),
        }
    }

    /// Register (or replace) the workspace root for a session.
    pub fn register_workspace(&self, session_id: &str, root: PathBuf) {
        debug!(session_id = %session_id, root = %root.display(), "Registered ACP workspace root");
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        roots.insert(session_id.to_string(), root);
    }

    /// Drop the workspace registration for a session.
    pub fn unregister_workspace(&self, session_id: &str) {
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        roots.remove(session_id);
    }

    /// Attach the file-change observer channel.
    pub fn set_observer(&self, tx: mpsc::Sender<FileChangeNotice>) {
        let mut observer = self.observer.lock().unwrap_or_else(|e| e.into_inner());
        *observer = Some(tx);
    }

    /// Read a text file inside the session's workspace.
    ///
    /// `line` is a 1-based starting line; `limit` caps the number of lines
    /// returned. Both default to the whole file.
    ///
    /// # Errors
    /// - `InvalidParams` when the path escapes the workspace root, the file
    ///   exceeds the size cap, or `line` is zero — all before reading.
    /// - `NotFound` for missing files, `PermissionDenied` for unreadable
    ///   ones.
    pub async fn read_text_file(
        &self,
        session_id: &str,
        path: &str,
        line: Option<u32>,
        limit: Option<u32>,
    ) -> Result<String> {
        if line == Some(0) {
            return Err(FemtoError::InvalidParams(
                "line offset is 1-based and must be >= 1".into(),
            ));
        }
        let resolved = self.resolve(session_id, path)?;

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| Self::map_io_error(e, &resolved))?;
        if metadata.len() > self.max_file_size {
            return Err(FemtoError::InvalidParams(format!(
                "file '{}' is {} bytes, exceeding the {} byte limit",
                resolved.display(),
                metadata.len(),
                self.max_file_size
            )));
        }

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| Self::map_io_error(e, &resolved))?;

        match (line, limit) {
            (None, None) => Ok(content),
            (start, count) => {
                let skip = start.map(|l| l as usize - 1).unwrap_or(0);
                let take = count.map(|l| l as usize).unwrap_or(usize::MAX);
                let selected: Vec<&str> = content.lines().skip(skip).take(take).collect();
                Ok(selected.join("\n"))
            }
        }
    }

    /// Write a text file inside the session's workspace, creating parent
    /// directories as needed, then notify the file-change observer.
    pub async fn write_text_file(&self, session_id: &str, path: &str, content: &str) -> Result<()> {
        let resolved = self.resolve(session_id, path)?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io_error(e, parent))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| Self::map_io_error(e, &resolved))?;

        self.notify_change(session_id, resolved);
        Ok(())
    }

    /// Resolve a request path against the session's workspace root,
    /// rejecting escapes. Purely lexical so writes to not-yet-existing
    /// paths can be validated too.
    fn resolve(&self, session_id: &str, path: &str) -> Result<PathBuf> {
        let root = {
            let roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
            roots
                .get(session_id)
                .cloned()
                .ok_or_else(|| {
                    FemtoError::NotFound(format!("no workspace registered for session {}", session_id))
                })?
        };

        let requested = Path::new(path);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            root.join(requested)
        };

        let normalized = Self::normalize(&joined);
        if !normalized.starts_with(&root) {
            return Err(FemtoError::InvalidParams(format!(
                "path '{}' escapes the workspace root",
                path
            )));
        }
        Ok(normalized)
    }

    /// Lexical normalization: collapse `.` and `..` without touching the
    /// filesystem.
    fn normalize(path: &Path) -> PathBuf {
        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        normalized
    }

    fn map_io_error(error: std::io::Error, path: &Path) -> FemtoError {
        match error.kind() {
            ErrorKind::NotFound => FemtoError::NotFound(format!("{}", path.display())),
            ErrorKind::PermissionDenied => {
                FemtoError::PermissionDenied(format!("{}", path.display()))
            }
            _ => FemtoError::Io(error),
        }
    }

    fn notify_change(&self, session_id: &str, path: PathBuf) {
        let observer = self.observer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = observer.as_ref() {
            let notice = FileChangeNotice {
                session_id: session_id.to_string(),
                path,
            };
            if let Err(e) = tx.try_send(notice) {
                warn!(error = %e, "Dropping file-change notice");
            }
        }
    }
}

impl Default for AcpFsHandler {
    fn default() -> Self {
        Self::new()
    }
}
