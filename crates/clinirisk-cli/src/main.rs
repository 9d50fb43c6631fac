//! Clinirisk CLI
//!
//! The `clinirisk` command scores patients held in the clinical store.
//!
//! ## Commands
//!
//! - `import`: load a cohort JSON document into the store
//! - `score` / `assess` / `dual`: tree-ensemble, rule-based or both
//! - `batch`: re-score the whole population
//! - `feedback`: record an observed outcome against an assessment
//! - `history` / `stats`: read back assessments and population summaries
//! - `model inspect`: load the model artifact and show its metadata

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clinirisk_core::{
    BatchOptions, CommitMode, EngineConfig, FsArtifactSource, LogFormat, ModelLifecycleManager,
    Outcome, ReloadOutcome, RiskService, ScorerKind,
};
use clinirisk_state::{ClinicalStore, CohortDocument, FeedbackLedger, SurrealClinicalStore};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "clinirisk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hospitalization-risk inference over the clinical store", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Model artifact path (overrides CLINIRISK_MODEL_PATH)
    #[arg(long, global = true, env = "CLINIRISK_MODEL_PATH")]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a cohort JSON document (patients, medications, events, measurements)
    Import {
        /// Path to the cohort JSON file
        file: PathBuf,
    },

    /// Score one patient with the tree ensemble
    Score { patient_id: String },

    /// Score one patient with the multi-axis rules
    Assess { patient_id: String },

    /// Run both scorers side by side
    Dual { patient_id: String },

    /// Re-score every patient in the store
    Batch {
        /// per_item or transactional
        #[arg(long)]
        commit: Option<CommitMode>,

        /// axes or ensemble
        #[arg(long)]
        scorer: Option<ScorerKind>,

        /// Patients scored concurrently in per_item mode
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Record an observed outcome for an assessment
    Feedback {
        assessment_id: Uuid,

        /// hospitalized, readmitted, deceased, no_event or free text
        outcome: Outcome,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Show saved assessments for a patient, oldest first
    History { patient_id: String },

    /// Population summary over the last 30 days
    Stats,

    /// Model artifact operations
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Load the artifact and print its metadata
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::from_env().context("Invalid CLINIRISK_* configuration")?;
    if let Some(path) = cli.model {
        config.model_path = path;
    }

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    clinirisk_core::init_tracing(cli.json || config.log_format == LogFormat::Json, level);

    match cli.command {
        Commands::Model {
            action: ModelAction::Inspect,
        } => cmd_model_inspect(&config.model_path).await,
        Commands::Import { file } => {
            let store = connect().await?;
            cmd_import(store.as_ref(), &file).await
        }
        Commands::Score { patient_id } => {
            let service = service(connect().await?, &config, true).await;
            let result = service.score(&patient_id).await?;
            print_json(&result)
        }
        Commands::Assess { patient_id } => {
            let service = service(connect().await?, &config, false).await;
            let result = service.assess_axes(&patient_id).await?;
            print_json(&result)
        }
        Commands::Dual { patient_id } => {
            let service = service(connect().await?, &config, true).await;
            let result = service.assess_dual(&patient_id).await?;
            print_json(&result)
        }
        Commands::Batch {
            commit,
            scorer,
            concurrency,
        } => {
            let mut options = BatchOptions::from(&config);
            if let Some(commit) = commit {
                options.commit_mode = commit;
            }
            if let Some(scorer) = scorer {
                options.scorer = scorer;
            }
            if let Some(n) = concurrency {
                options.concurrency = n.max(1);
            }
            let wants_model = options.scorer == ScorerKind::Ensemble;
            let service = service(connect().await?, &config, wants_model).await;
            cmd_batch(&service, options).await
        }
        Commands::Feedback {
            assessment_id,
            outcome,
            notes,
        } => {
            let service = service(connect().await?, &config, false).await;
            let entry = service
                .submit_feedback(assessment_id, outcome, notes)
                .await
                .context("Failed to record feedback")?;
            println!("Recorded feedback {}", entry.feedback_id);
            Ok(())
        }
        Commands::History { patient_id } => {
            let service = service(connect().await?, &config, false).await;
            cmd_history(&service, &patient_id).await
        }
        Commands::Stats => {
            let service = service(connect().await?, &config, false).await;
            let stats = service.population_stats().await?;
            print_json(&stats)
        }
    }
}

async fn connect() -> Result<Arc<SurrealClinicalStore>> {
    let store = SurrealClinicalStore::from_env()
        .await
        .context("Failed to connect to the clinical store")?;
    Ok(Arc::new(store))
}

/// Build the scoring facade. `wants_model` only controls whether a failed
/// first load is reported up front; commands that need no model still work.
async fn service(
    store: Arc<SurrealClinicalStore>,
    config: &EngineConfig,
    wants_model: bool,
) -> RiskService {
    let source = Arc::new(FsArtifactSource::new(&config.model_path));
    let (models, outcome) = ModelLifecycleManager::start(source).await;
    if let ReloadOutcome::Failed(reason) = outcome {
        if wants_model {
            warn!(path = %config.model_path.display(), %reason, "model artifact not loaded");
        }
    }
    let ledger: Arc<dyn FeedbackLedger> = store.clone();
    let store: Arc<dyn ClinicalStore> = store;
    RiskService::new(store, ledger, models)
}

async fn cmd_history(service: &RiskService, patient_id: &str) -> Result<()> {
    let history = service.risk_history(patient_id).await?;
    if history.is_empty() {
        println!("No assessments found for '{}'", patient_id);
        return Ok(());
    }
    for a in history {
        println!(
            "{}  {:>3}  {:<8}  {}",
            a.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            a.total_score,
            a.risk_tier.as_str(),
            a.assessment_id
        );
    }
    Ok(())
}

async fn cmd_import(store: &dyn ClinicalStore, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let cohort = CohortDocument::from_json(&text)
        .with_context(|| format!("Invalid cohort document {}", file.display()))?;
    let summary = cohort
        .import_into(store)
        .await
        .context("Import stopped at a failed write")?;

    println!(
        "Imported {} patients, {} medications, {} events, {} measurements",
        summary.patients, summary.medications, summary.events, summary.measurements
    );
    Ok(())
}

async fn cmd_batch(service: &RiskService, options: BatchOptions) -> Result<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling batch");
            let _ = cancel_tx.send(true);
        }
    });

    let summary = service
        .run_batch(options, cancel_rx)
        .await
        .context("Batch could not read the population")?;

    println!(
        "Batch {}: {} processed, {} failed in {} ms ({})",
        summary.run_id, summary.processed, summary.failed, summary.duration_ms, summary.commit_mode
    );
    for failure in &summary.failures {
        println!("  {}: {}", failure.patient_id, failure.error);
    }
    if summary.cancelled {
        bail!("batch cancelled");
    }
    Ok(())
}

async fn cmd_model_inspect(path: &Path) -> Result<()> {
    let source = Arc::new(FsArtifactSource::new(path));
    let (manager, outcome) = ModelLifecycleManager::start(source).await;
    if let ReloadOutcome::Failed(reason) = outcome {
        bail!("Failed to load model artifact {}: {}", path.display(), reason);
    }
    print_json(&manager.status())?;

    if let Some(model) = manager.active() {
        let features: Vec<&str> = model.referenced_features().into_iter().collect();
        println!("Features: {}", features.join(", "));
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn batch_flags_parse_into_core_types() {
        let cli = Cli::parse_from([
            "clinirisk",
            "batch",
            "--commit",
            "transactional",
            "--scorer",
            "ensemble",
            "--concurrency",
            "4",
        ]);
        match cli.command {
            Commands::Batch {
                commit,
                scorer,
                concurrency,
            } => {
                assert_eq!(commit, Some(CommitMode::Transactional));
                assert_eq!(scorer, Some(ScorerKind::Ensemble));
                assert_eq!(concurrency, Some(4));
            }
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn feedback_parses_outcome_and_id() {
        let id = Uuid::new_v4();
        let cli = Cli::parse_from([
            "clinirisk",
            "feedback",
            &id.to_string(),
            "readmitted",
            "--notes",
            "day 9",
        ]);
        match cli.command {
            Commands::Feedback {
                assessment_id,
                outcome,
                notes,
            } => {
                assert_eq!(assessment_id, id);
                assert_eq!(outcome, Outcome::Readmitted);
                assert_eq!(notes.as_deref(), Some("day 9"));
            }
            _ => panic!("expected feedback"),
        }
    }

    #[tokio::test]
    async fn inspect_reports_missing_artifact() {
        let err = cmd_model_inspect(Path::new("/nonexistent/model.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model.json"));
    }
}
