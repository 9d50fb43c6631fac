//! Owner of the active model artifact.
//!
//! State machine:
//!
//! ```text
//! Unloaded ──parse ok──▶ Loaded(v1) ──parse ok, new digest──▶ Loaded(v2)
//!                            │
//!                            └──parse/read failure──▶ Loaded(v1) (retry on next change)
//! ```
//!
//! Readers take an `Arc` snapshot under a short read lock, so a scoring call
//! sees one artifact from start to finish while a reload swaps the pointer.
//! Reloads are serialized by an async mutex; failures are logged and
//! counted, never returned to scoring callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::source::{ArtifactSource, SourceStamp};
use crate::ensemble::{ModelArtifact, ModelDigest, ModelMetadata};
use crate::error::{ArtifactError, RiskError};
use crate::metrics::METRICS;
use crate::obs;

/// Result of one reload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new artifact is now active.
    Swapped { version: String, digest: ModelDigest },
    /// The document matches the active artifact's digest.
    Unchanged,
    /// Read or parse failed; the previous artifact (if any) stays active.
    Failed(String),
}

impl ReloadOutcome {
    pub fn is_swapped(&self) -> bool {
        matches!(self, ReloadOutcome::Swapped { .. })
    }
}

/// Snapshot of the manager for `model inspect` and health logs.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleStatus {
    pub source: String,
    pub loaded: bool,
    pub metadata: Option<ModelMetadata>,
    pub digest: Option<ModelDigest>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub trees: usize,
    pub attempts: u64,
    pub swaps: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

pub struct ModelLifecycleManager {
    source: Arc<dyn ArtifactSource>,
    active: RwLock<Option<Arc<ModelArtifact>>>,
    reload_lock: tokio::sync::Mutex<()>,
    last_stamp: Mutex<Option<SourceStamp>>,
    last_error: Mutex<Option<String>>,
    attempts: AtomicU64,
    swaps: AtomicU64,
    failures: AtomicU64,
}

impl ModelLifecycleManager {
    /// Create an unloaded manager over `source`.
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            active: RwLock::new(None),
            reload_lock: tokio::sync::Mutex::new(()),
            last_stamp: Mutex::new(None),
            last_error: Mutex::new(None),
            attempts: AtomicU64::new(0),
            swaps: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Create a manager and attempt the first load. The manager is returned
    /// even when that load fails; it stays unloaded until a later reload.
    pub async fn start(source: Arc<dyn ArtifactSource>) -> (Arc<Self>, ReloadOutcome) {
        let manager = Arc::new(Self::new(source));
        let outcome = manager.reload().await;
        (manager, outcome)
    }

    /// Snapshot of the active artifact.
    pub fn active(&self) -> Option<Arc<ModelArtifact>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Active artifact, or `ModelUnavailable` if none was ever loaded.
    pub fn require_active(&self) -> Result<Arc<ModelArtifact>, RiskError> {
        self.active().ok_or(RiskError::ModelUnavailable)
    }

    /// Read, parse and publish the current document.
    pub async fn reload(&self) -> ReloadOutcome {
        let _serial = self.reload_lock.lock().await;
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let stamp = self.source.stamp().await;
        *self.last_stamp.lock().unwrap_or_else(PoisonError::into_inner) = stamp;

        match self.read_artifact().await {
            Ok(artifact) => self.publish(artifact),
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                METRICS.inc_model_reload_failures();
                let previous = self.active();
                obs::emit_model_reload_failed(&err, previous.as_ref().map(|a| a.version()));
                let message = err.to_string();
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(message.clone());
                ReloadOutcome::Failed(message)
            }
        }
    }

    /// `true` when the source's stamp differs from the one seen at the last
    /// reload attempt.
    pub async fn source_changed(&self) -> bool {
        let current = self.source.stamp().await;
        let seen = *self.last_stamp.lock().unwrap_or_else(PoisonError::into_inner);
        current.is_some() && current != seen
    }

    pub fn source(&self) -> &Arc<dyn ArtifactSource> {
        &self.source
    }

    pub fn status(&self) -> LifecycleStatus {
        let active = self.active();
        LifecycleStatus {
            source: self.source.describe(),
            loaded: active.is_some(),
            metadata: active.as_ref().map(|a| a.metadata.clone()),
            digest: active.as_ref().map(|a| a.digest.clone()),
            loaded_at: active.as_ref().map(|a| a.loaded_at),
            trees: active.as_ref().map_or(0, |a| a.trees.len()),
            attempts: self.attempts.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    async fn read_artifact(&self) -> Result<ModelArtifact, ArtifactError> {
        let bytes = self.source.read().await?;
        ModelArtifact::from_bytes(&bytes)
    }

    fn publish(&self, artifact: ModelArtifact) -> ReloadOutcome {
        let mut slot = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|a| a.digest == artifact.digest) {
            debug!(digest = %artifact.digest.short(), "model document unchanged");
            return ReloadOutcome::Unchanged;
        }

        let version = artifact.metadata.version.clone();
        let digest = artifact.digest.clone();
        obs::emit_model_swapped(
            &artifact.metadata.model_name,
            &version,
            digest.short(),
            artifact.trees.len(),
        );
        *slot = Some(Arc::new(artifact));
        drop(slot);

        self.swaps.fetch_add(1, Ordering::Relaxed);
        METRICS.inc_model_reloads();
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
        ReloadOutcome::Swapped { version, digest }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::MemoryArtifactSource;

    fn doc(version: &str, leaf: f64) -> Vec<u8> {
        format!(
            r#"{{"model_name": "m", "version": "{version}", "base_score": 0.0,
                "trees": [{{"nodeid": 0, "leaf": {leaf}}}]}}"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn unloaded_until_first_successful_parse() {
        let source = Arc::new(MemoryArtifactSource::new());
        let (manager, outcome) = ModelLifecycleManager::start(source.clone()).await;
        assert!(matches!(outcome, ReloadOutcome::Failed(_)));
        assert!(manager.active().is_none());
        assert!(matches!(
            manager.require_active(),
            Err(RiskError::ModelUnavailable)
        ));

        source.publish(doc("1", 0.1));
        assert!(manager.reload().await.is_swapped());
        assert_eq!(manager.require_active().unwrap().version(), "1");
    }

    #[tokio::test]
    async fn same_digest_is_unchanged() {
        let source = Arc::new(MemoryArtifactSource::with_document(doc("1", 0.1)));
        let (manager, _) = ModelLifecycleManager::start(source.clone()).await;
        source.publish(doc("1", 0.1));
        assert_eq!(manager.reload().await, ReloadOutcome::Unchanged);
        assert_eq!(manager.status().swaps, 1);
    }

    #[tokio::test]
    async fn failed_parse_keeps_previous_artifact() {
        let source = Arc::new(MemoryArtifactSource::with_document(doc("1", 0.1)));
        let (manager, _) = ModelLifecycleManager::start(source.clone()).await;
        let before = manager.active().unwrap();

        source.publish(b"{\"trees\": [{\"nodeid\": 0, \"sp".to_vec());
        assert!(matches!(manager.reload().await, ReloadOutcome::Failed(_)));

        let after = manager.active().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        let status = manager.status();
        assert_eq!(status.failures, 1);
        assert!(status.last_error.is_some());

        source.publish(doc("2", 0.2));
        assert!(manager.reload().await.is_swapped());
        assert_eq!(manager.active().unwrap().version(), "2");
        assert!(manager.status().last_error.is_none());
    }

    #[tokio::test]
    async fn source_changed_tracks_stamps() {
        let source = Arc::new(MemoryArtifactSource::with_document(doc("1", 0.1)));
        let (manager, _) = ModelLifecycleManager::start(source.clone()).await;
        assert!(!manager.source_changed().await);
        source.publish(doc("2", 0.1));
        assert!(manager.source_changed().await);
    }
}
