//! Clinirisk Core
//!
//! Hospitalization-risk inference over the clinical store:
//!
//! - `ensemble`: gradient-boosted tree scoring with path attribution
//! - `axes`: clinical / pharmacological / contextual rule aggregation
//! - `lifecycle`: the active model artifact and its hot-reload watcher
//! - `batch`: population re-scoring with per-patient failure isolation
//! - `service`: the single-patient facade used by the binaries

pub mod analytics;
pub mod axes;
pub mod batch;
pub mod calculators;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod feedback;
pub mod lifecycle;
pub mod metrics;
pub mod obs;
pub mod service;
pub mod telemetry;

pub use analytics::{ConditionCount, MeanAxes, PopulationStats};
pub use axes::AxisAssessment;
pub use batch::{
    BatchFailure, BatchOptions, BatchPipeline, BatchSummary, CommitMode, ScorerKind,
};
pub use config::EngineConfig;
pub use ensemble::{Explanation, ModelArtifact, ModelDigest, ModelMetadata, TreeNode};
pub use error::{ArtifactError, Result, RiskError, ValidationError};
pub use features::{FeatureVector, PatientBundle};
pub use feedback::FeedbackService;
pub use lifecycle::{
    spawn_watcher, ArtifactSource, FsArtifactSource, LifecycleStatus, MemoryArtifactSource,
    ModelLifecycleManager, ReloadOutcome, ReloadTrigger, SourceStamp, WatchOptions,
};
pub use service::{DualAssessment, RiskService, ScoreResponse};
pub use telemetry::{init_tracing, LogFormat};

pub use clinirisk_state::{
    AxisScores, CompositeAssessment, Driver, FeedbackRecord, Outcome, Pathology, RiskTier,
};
