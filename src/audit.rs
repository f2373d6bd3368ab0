// src/audit.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, error};
use tokio::fs::OpenOptions;
use tokio::io::{self, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditCategory {
    Joined,
    Disconnected,
    Errors,
}

impl AuditCategory {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Joined => "playerjoined.log",
            Self::Disconnected => "playerdisconnected.log",
            Self::Errors => "errors.log",
        }
    }
}

/// Appends `line` plus a newline to `path`, creating the file if needed.
pub async fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    let mut record = String::with_capacity(line.len() + 1);
    record.push_str(line);
    record.push('\n');
    file.write_all(record.as_bytes()).await?;
    file.flush().await
}

/// Best-effort, append-only event logs, one plain-text file per category.
///
/// Writers to the same file are serialized in-process so concurrent streams
/// never interleave partial lines. Waiting writers yield to the runtime.
pub struct AuditLogger {
    dir: PathBuf,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl AuditLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn path_for(&self, category: AuditCategory) -> PathBuf {
        self.dir.join(category.file_name())
    }

    pub async fn record(&self, category: AuditCategory, line: &str) {
        self.append(&self.path_for(category), line).await;
    }

    /// Failures are logged and never reach the caller.
    pub async fn append(&self, path: &Path, line: &str) {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        match append_line(path, line).await {
            Ok(()) => debug!("Appended to {}", path.display()),
            Err(e) => error!("Failed to append to audit log {}: {}", path.display(), e),
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
