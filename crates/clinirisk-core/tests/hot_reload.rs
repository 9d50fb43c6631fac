//! Model hot reload: snapshot atomicity, watcher debounce, filesystem swaps.

use std::sync::Arc;
use std::time::Duration;

use clinirisk_core::ensemble::predict;
use clinirisk_core::{
    spawn_watcher, FeatureVector, FsArtifactSource, MemoryArtifactSource, ModelLifecycleManager,
    ReloadOutcome, WatchOptions,
};
use tokio::sync::watch;

/// Single-leaf model; every patient scores `round(sigmoid(leaf) * 100)`.
fn constant_model(version: &str, leaf: f64) -> String {
    format!(
        r#"{{"model_name": "readmission", "version": "{version}", "base_score": 0.0,
            "trees": [{{"nodeid": 0, "leaf": {leaf}}}]}}"#
    )
}

/// Ten trees that each split on `age`; a torn read across two versions
/// would produce a score neither version can.
fn deep_model(version: &str, leaf: f64) -> String {
    let tree = format!(
        r#"{{"nodeid": 0, "split": "age", "split_condition": 50, "yes": 1, "no": 2,
            "children": [{{"nodeid": 1, "leaf": {leaf}}}, {{"nodeid": 2, "leaf": 0.0}}]}}"#
    );
    let trees = vec![tree; 10].join(",");
    format!(
        r#"{{"model_name": "readmission", "version": "{version}", "base_score": 0.0,
            "trees": [{trees}]}}"#
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_a_half_swapped_model() {
    let source = Arc::new(MemoryArtifactSource::with_document(deep_model("a", 0.1)));
    let (manager, outcome) = ModelLifecycleManager::start(source.clone()).await;
    assert!(outcome.is_swapped());

    let features = FeatureVector::new().with("age", 70.0);
    // 10 × 0.1 = 1.0 → 73; 10 × -0.1 = -1.0 → 27
    let allowed = [73u8, 27u8];

    let mut readers = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        let features = features.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..500 {
                let model = manager.active().expect("model stays loaded");
                let score = predict(&model, &features);
                assert!(allowed.contains(&score), "torn score {score}");
                tokio::task::yield_now().await;
            }
        }));
    }

    for i in 0..50 {
        let leaf = if i % 2 == 0 { -0.1 } else { 0.1 };
        source.publish(deep_model(&format!("v{i}"), leaf));
        manager.reload().await;
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }
}

#[tokio::test]
async fn snapshot_outlives_a_swap() {
    let source = Arc::new(MemoryArtifactSource::with_document(constant_model("1", 0.0)));
    let (manager, _) = ModelLifecycleManager::start(source.clone()).await;

    let held = manager.active().unwrap();
    source.publish(constant_model("2", 2.0));
    assert!(manager.reload().await.is_swapped());

    let features = FeatureVector::new();
    assert_eq!(predict(&held, &features), 50);
    assert_eq!(predict(&manager.active().unwrap(), &features), 88);
}

#[tokio::test(start_paused = true)]
async fn burst_of_notifications_triggers_one_reload() {
    let source = Arc::new(MemoryArtifactSource::with_document(constant_model("1", 0.0)));
    let (manager, _) = ModelLifecycleManager::start(source.clone()).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let opts = WatchOptions {
        // polling is effectively off for this test
        poll_interval: Duration::from_secs(3_600),
        debounce: Duration::from_millis(100),
    };
    let (trigger, handle) = spawn_watcher(Arc::clone(&manager), opts, shutdown_rx);
    tokio::time::sleep(Duration::from_millis(1)).await;
    let attempts_before = manager.status().attempts;

    source.publish(constant_model("2", 1.0));
    for _ in 0..5 {
        assert!(trigger.notify());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    let status = manager.status();
    assert_eq!(status.attempts, attempts_before + 1);
    assert_eq!(manager.active().unwrap().version(), "2");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
    assert!(!trigger.notify());
}

#[tokio::test(start_paused = true)]
async fn watcher_polls_for_stamp_changes() {
    let source = Arc::new(MemoryArtifactSource::with_document(constant_model("1", 0.0)));
    let (manager, _) = ModelLifecycleManager::start(source.clone()).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let opts = WatchOptions {
        poll_interval: Duration::from_millis(500),
        debounce: Duration::from_millis(50),
    };
    let (_trigger, handle) = spawn_watcher(Arc::clone(&manager), opts, shutdown_rx);

    source.publish(constant_model("2", 1.0));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(manager.active().unwrap().version(), "2");

    // nothing changed since: further ticks do not reload
    let attempts = manager.status().attempts;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(manager.status().attempts, attempts);

    drop(shutdown_tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn filesystem_artifact_swaps_and_survives_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    tokio::fs::write(&path, constant_model("1", 0.0)).await.unwrap();

    let source = Arc::new(FsArtifactSource::new(&path));
    let (manager, outcome) = ModelLifecycleManager::start(source).await;
    assert!(outcome.is_swapped());
    assert_eq!(manager.status().source, path.display().to_string());

    tokio::fs::write(&path, b"{\"trees\": [").await.unwrap();
    assert!(matches!(manager.reload().await, ReloadOutcome::Failed(_)));
    assert_eq!(manager.active().unwrap().version(), "1");

    tokio::fs::write(&path, constant_model("2", 1.0)).await.unwrap();
    assert!(manager.reload().await.is_swapped());
    assert_eq!(manager.active().unwrap().version(), "2");

    tokio::fs::remove_file(&path).await.unwrap();
    assert!(matches!(manager.reload().await, ReloadOutcome::Failed(_)));
    assert_eq!(manager.active().unwrap().version(), "2");
    assert_eq!(manager.status().swaps, 2);
}
