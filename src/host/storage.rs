//! Persistent storage primitives used by the snapshot cache

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Error, Result};

/// Directory-ensure, write and resolve primitives.
///
/// Paths are `/`-separated and relative to the storage root.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create `dir` (and parents). Succeeds if it already exists.
    async fn ensure_dir(&self, dir: &str) -> Result<()>;

    /// Overwrite `path` with `bytes`.
    async fn write_binary(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Overwrite `path` with `text`.
    async fn write_text(&self, path: &str, text: &str) -> Result<()>;

    /// Resolve a stored path into a reference the host can load.
    fn resource_path(&self, path: &str) -> String;
}

/// Storage rooted at a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
            full.push(part);
        }
        full
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn ensure_dir(&self, dir: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.resolve(dir)).await?;
        Ok(())
    }

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::write(self.resolve(path), bytes).await?;
        Ok(())
    }

    async fn write_text(&self, path: &str, text: &str) -> Result<()> {
        tokio::fs::write(self.resolve(path), text.as_bytes()).await?;
        Ok(())
    }

    fn resource_path(&self, path: &str) -> String {
        format!("file://{}", self.resolve(path).display())
    }
}

/// Storage that keeps files in a map; writes into directories that were
/// never ensured fail, like a real filesystem would.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    dirs: Mutex<HashSet<String>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    ensure_calls: AtomicUsize,
    write_calls: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap_or_else(|p| p.into_inner()).get(path).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn write(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Persistence(format!("write to {} rejected", path)));
        }
        let parent = path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        if !parent.is_empty() && !self.dirs.lock().unwrap_or_else(|p| p.into_inner()).contains(parent) {
            return Err(Error::Persistence(format!("no such directory: {}", parent)));
        }
        self.files
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(path.to_string(), bytes);
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ensure_dir(&self, dir: &str) -> Result<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        // Directory creation is a suspension point on real hosts.
        tokio::task::yield_now().await;
        self.dirs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(dir.trim_end_matches('/').to_string());
        Ok(())
    }

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.write(path, bytes.to_vec())
    }

    async fn write_text(&self, path: &str, text: &str) -> Result<()> {
        self.write(path, text.as_bytes().to_vec())
    }

    fn resource_path(&self, path: &str) -> String {
        format!("memory://{}", path)
    }
}
