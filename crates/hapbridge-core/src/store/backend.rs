// ── Storage backends ──
//
// Raw key/value persistence underneath the identity store. Keys are flat
// file names; values are opaque bytes (JSON in practice).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use crate::error::CoreError;

/// Byte-level persistence used by [`IdentityStore`](super::IdentityStore).
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Read the value stored under `key`. A missing key is `Ok(None)`.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;

    /// Replace the value stored under `key`.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CoreError>;
}

// ── FileBackend ─────────────────────────────────────────────────────

/// One file per key inside a storage directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl IdentityBackend for FileBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::persistence(key, e)),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CoreError::persistence(key, e))?;

        // Write-then-rename so a crash never leaves a truncated record.
        let target = self.path_for(key);
        let staging = self.path_for(&format!(".{key}.tmp"));
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|e| CoreError::persistence(key, e))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| CoreError::persistence(key, e))?;

        trace!(path = %target.display(), len = bytes.len(), "wrote identity record");
        Ok(())
    }
}

// ── MemoryBackend ───────────────────────────────────────────────────

/// In-memory backend for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Vec<u8>>,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl IdentityBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CoreError> {
        self.entries.insert(key.to_owned(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_backend_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        assert!(backend.read("absent.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_backend_creates_root_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("nested"));
        backend.write("a.json", b"{}").await.unwrap();
        assert_eq!(backend.read("a.json").await.unwrap().unwrap(), b"{}");
        assert!(!dir.path().join("nested").join(".a.json.tmp").exists());
    }

    #[tokio::test]
    async fn memory_backend_counts_writes() {
        let backend = MemoryBackend::new();
        backend.write("k", b"1").await.unwrap();
        backend.write("k", b"2").await.unwrap();
        assert_eq!(backend.write_count(), 2);
        assert_eq!(backend.read("k").await.unwrap().unwrap(), b"2");
        assert_eq!(backend.keys(), vec!["k".to_owned()]);
    }
}
