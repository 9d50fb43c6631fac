//! Engine configuration resolved from `CLINIRISK_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::batch::{CommitMode, ScorerKind};
use crate::error::{Result, RiskError};
use crate::lifecycle::WatchOptions;
use crate::telemetry::LogFormat;

pub const DEFAULT_MODEL_PATH: &str = "models/xgboost_readmission.json";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;
pub const DEFAULT_BATCH_INTERVAL_SECS: u64 = 3_600;

/// Runtime knobs shared by the CLI and the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub model_path: PathBuf,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub batch_commit: CommitMode,
    pub batch_concurrency: usize,
    pub batch_scorer: ScorerKind,
    pub batch_interval: Duration,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            batch_commit: CommitMode::PerItem,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            batch_scorer: ScorerKind::Axes,
            batch_interval: Duration::from_secs(DEFAULT_BATCH_INTERVAL_SECS),
            log_format: LogFormat::Text,
        }
    }
}

impl EngineConfig {
    /// Read the process environment. Unset variables keep their defaults;
    /// set-but-unparseable ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("CLINIRISK_MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CLINIRISK_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CLINIRISK_DEBOUNCE_MS")? {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(mode) = parse_var::<CommitMode>(&lookup, "CLINIRISK_BATCH_COMMIT")? {
            config.batch_commit = mode;
        }
        if let Some(n) = parse_var::<usize>(&lookup, "CLINIRISK_BATCH_CONCURRENCY")? {
            config.batch_concurrency = n.max(1);
        }
        if let Some(kind) = parse_var::<ScorerKind>(&lookup, "CLINIRISK_BATCH_SCORER")? {
            config.batch_scorer = kind;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CLINIRISK_BATCH_INTERVAL_SECS")? {
            config.batch_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(format) = lookup("CLINIRISK_LOG_FORMAT") {
            config.log_format = LogFormat::parse(&format);
        }

        Ok(config)
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            poll_interval: self.poll_interval,
            debounce: self.debounce,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RiskError::Config(format!("{key}={raw}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.debounce, Duration::from_millis(100));
        assert_eq!(config.batch_commit, CommitMode::PerItem);
    }

    #[test]
    fn reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CLINIRISK_MODEL_PATH", "/srv/model.json"),
            ("CLINIRISK_POLL_INTERVAL_MS", "250"),
            ("CLINIRISK_DEBOUNCE_MS", "50"),
            ("CLINIRISK_BATCH_COMMIT", "transactional"),
            ("CLINIRISK_BATCH_CONCURRENCY", "0"),
            ("CLINIRISK_BATCH_SCORER", "ensemble"),
            ("CLINIRISK_BATCH_INTERVAL_SECS", "60"),
            ("CLINIRISK_LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.model_path, PathBuf::from("/srv/model.json"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.watch_options().debounce, Duration::from_millis(50));
        assert_eq!(config.batch_commit, CommitMode::Transactional);
        assert_eq!(config.batch_concurrency, 1);
        assert_eq!(config.batch_scorer, ScorerKind::Ensemble);
        assert_eq!(config.batch_interval, Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = EngineConfig::from_lookup(lookup(&[("CLINIRISK_DEBOUNCE_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CLINIRISK_DEBOUNCE_MS"));
    }
}
