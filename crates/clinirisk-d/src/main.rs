//! Clinirisk daemon.
//!
//! Loads the model artifact, keeps it fresh with the reload watcher and
//! re-scores the population on a fixed interval until Ctrl-C. On unix,
//! SIGHUP forces a model reload.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clinirisk_core::metrics::METRICS;
use clinirisk_core::{
    spawn_watcher, BatchOptions, EngineConfig, FsArtifactSource, LogFormat, ModelLifecycleManager,
    ReloadOutcome, ReloadTrigger, RiskService,
};
use clinirisk_state::SurrealClinicalStore;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env().context("Invalid CLINIRISK_* configuration")?;
    clinirisk_core::init_tracing(config.log_format == LogFormat::Json, Level::INFO);

    let store = Arc::new(
        SurrealClinicalStore::from_env()
            .await
            .context("Failed to connect to the clinical store")?,
    );

    let source = Arc::new(FsArtifactSource::new(&config.model_path));
    let (models, outcome) = ModelLifecycleManager::start(source).await;
    if let ReloadOutcome::Failed(reason) = outcome {
        warn!(
            path = %config.model_path.display(),
            %reason,
            "starting without a model; ensemble scoring waits for a valid artifact"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (trigger, watcher) = spawn_watcher(
        Arc::clone(&models),
        config.watch_options(),
        shutdown_rx.clone(),
    );
    spawn_signal_handlers(shutdown_tx, trigger);

    let service = RiskService::new(store.clone(), store, models);
    let runs = serve(
        &service,
        BatchOptions::from(&config),
        config.batch_interval,
        shutdown_rx,
    )
    .await;

    watcher.await.context("model watcher panicked")?;
    METRICS.flush();
    info!(runs, "clinirisk-d stopped");
    Ok(())
}

fn spawn_signal_handlers(shutdown: watch::Sender<bool>, trigger: ReloadTrigger) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        let _ = shutdown.send(true);
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "SIGHUP handler unavailable");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading model");
            if !trigger.notify() {
                break;
            }
        }
    });
    #[cfg(not(unix))]
    drop(trigger);
}

/// Run the batch pipeline every `every` until `shutdown` flips. The first
/// run starts immediately. A shutdown during a run cancels that run.
/// Returns the number of runs that completed.
async fn serve(
    service: &RiskService,
    options: BatchOptions,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut ticker = time::interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut runs = 0;

    info!(
        every_secs = every.as_secs(),
        commit_mode = %options.commit_mode,
        scorer = %options.scorer,
        "batch scheduler started"
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match service.run_batch(options, shutdown.clone()).await {
                    Ok(summary) if summary.cancelled => break,
                    Ok(_) => runs += 1,
                    Err(e) => error!(error = %e, "batch run could not start"),
                }
            }
        }
    }
    runs
}
