//! Model lifecycle: artifact sources, the active-artifact owner and the
//! background reload watcher.

pub mod manager;
pub mod source;
pub mod watcher;

pub use manager::{LifecycleStatus, ModelLifecycleManager, ReloadOutcome};
pub use source::{ArtifactSource, FsArtifactSource, MemoryArtifactSource, SourceStamp};
pub use watcher::{spawn_watcher, ReloadTrigger, WatchOptions};
