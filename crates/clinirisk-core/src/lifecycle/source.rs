//! Where model artifact bytes come from.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;

/// Cheap change marker for an artifact location.
///
/// Two equal stamps mean "probably unchanged"; the manager still compares
/// content digests before publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceStamp {
    pub len: u64,
    pub modified_nanos: u128,
}

/// A named location holding the current serialized model document.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Read the full document.
    async fn read(&self) -> std::io::Result<Vec<u8>>;

    /// Current change stamp, `None` when the location is unreachable.
    async fn stamp(&self) -> Option<SourceStamp>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// Model document on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsArtifactSource {
    path: PathBuf,
}

impl FsArtifactSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ArtifactSource for FsArtifactSource {
    async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    async fn stamp(&self) -> Option<SourceStamp> {
        let meta = tokio::fs::metadata(&self.path).await.ok()?;
        let modified_nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        Some(SourceStamp {
            len: meta.len(),
            modified_nanos,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// In-memory artifact location for tests and embedding.
///
/// Every `publish` bumps a generation counter that doubles as the stamp.
#[derive(Debug, Default)]
pub struct MemoryArtifactSource {
    bytes: Mutex<Option<Vec<u8>>>,
    generation: AtomicU64,
}

impl MemoryArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(bytes: impl Into<Vec<u8>>) -> Self {
        let source = Self::new();
        source.publish(bytes);
        source
    }

    /// Replace the stored document.
    pub fn publish(&self, bytes: impl Into<Vec<u8>>) {
        *self.bytes.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.into());
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Make the location unreachable.
    pub fn clear(&self) {
        *self.bytes.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactSource for MemoryArtifactSource {
    async fn read(&self) -> std::io::Result<Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner).clone().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no model document published")
        })
    }

    async fn stamp(&self) -> Option<SourceStamp> {
        let len = self.bytes.lock().unwrap_or_else(PoisonError::into_inner).as_ref()?.len() as u64;
        Some(SourceStamp {
            len,
            modified_nanos: u128::from(self.generation.load(Ordering::SeqCst)),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
