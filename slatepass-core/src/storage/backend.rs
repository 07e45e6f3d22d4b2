//! Blob store backends

use super::{BlobPatch, Result, StorageBlob, StorageError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A place a [`StorageBlob`] can be kept
pub trait BlobStore: Send + Sync {
    /// Read the whole blob. A store that was never written reads as empty.
    fn read(&self) -> Result<StorageBlob>;

    /// Store only the slots present in `patch`
    fn write(&self, patch: &BlobPatch) -> Result<()>;

    /// Remove every slot
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    blob: StorageBlob,
    unavailable: bool,
    writes: usize,
}

/// In-memory store. Clones share the same blob.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: StorageBlob) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                blob,
                ..Default::default()
            })),
        }
    }

    /// While unavailable every operation fails with [`StorageError::StorageUnavailable`]
    pub fn set_available(&self, available: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = !available;
        }
    }

    /// Current contents, regardless of availability
    pub fn snapshot(&self) -> StorageBlob {
        self.inner
            .lock()
            .map(|inner| inner.blob.clone())
            .unwrap_or_default()
    }

    /// Number of successful `write` and `clear` calls
    pub fn write_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut MemoryInner) -> T) -> Result<T> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StorageError::StorageUnavailable("memory store poisoned".to_string()))?;
        if inner.unavailable {
            return Err(StorageError::StorageUnavailable(
                "memory store offline".to_string(),
            ));
        }
        Ok(f(&mut inner))
    }
}

impl BlobStore for MemoryStore {
    fn read(&self) -> Result<StorageBlob> {
        self.with_inner(|inner| inner.blob.clone())
    }

    fn write(&self, patch: &BlobPatch) -> Result<()> {
        self.with_inner(|inner| {
            inner.blob.apply(patch);
            inner.writes += 1;
        })
    }

    fn clear(&self) -> Result<()> {
        self.with_inner(|inner| {
            inner.blob = StorageBlob::default();
            inner.writes += 1;
        })
    }
}

/// Store kept as a JSON document on disk.
///
/// Writes go to a sibling temp file that is then renamed over the target.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn store(&self, blob: &StorageBlob) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(blob)?;
        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        debug!("Wrote blob store {}", self.path.display());
        Ok(())
    }
}

impl BlobStore for FileStore {
    fn read(&self) -> Result<StorageBlob> {
        if !self.path.exists() {
            return Ok(StorageBlob::default());
        }
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(StorageBlob::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn write(&self, patch: &BlobPatch) -> Result<()> {
        let mut blob = self.read()?;
        blob.apply(patch);
        self.store(&blob)
    }

    fn clear(&self) -> Result<()> {
        self.store(&StorageBlob::default())
    }
}
