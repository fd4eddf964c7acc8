use std::future::Future;

use super::{make_record, TestResult};
use crate::record::rfc3339_from_ms;
use crate::{SnapshotStore, StoreError};

pub(super) async fn run_synced_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "synced",
        "local_write_preserves_previous_synced_at",
        local_write_preserves_previous_synced_at(factory).await,
    ));
    results.push(TestResult::from_result(
        "synced",
        "mark_synced_stamps_and_resets_retry",
        mark_synced_stamps_and_resets_retry(factory).await,
    ));
    results.push(TestResult::from_result(
        "synced",
        "mark_synced_missing_returns_not_found",
        mark_synced_missing_returns_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "synced",
        "newer_local_write_makes_record_unsynced_again",
        newer_local_write_makes_record_unsynced_again(factory).await,
    ));

    results
}

async fn local_write_preserves_previous_synced_at<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .put(make_record("f1", "r1", 10_000))
        .await
        .map_err(|e| e.to_string())?;
    let synced = rfc3339_from_ms(11_000);
    store
        .mark_synced("f1", "r1", &synced)
        .await
        .map_err(|e| e.to_string())?;

    // A later local write carries synced_at: None; the stamp must survive.
    store
        .put(make_record("f1", "r1", 20_000))
        .await
        .map_err(|e| e.to_string())?;
    let got = store
        .get("f1", "r1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("record missing")?;
    if got.synced_at.as_deref() != Some(synced.as_str()) {
        return Err(format!(
            "synced_at not preserved across local write: {:?}",
            got.synced_at
        ));
    }
    Ok(())
}

async fn mark_synced_stamps_and_resets_retry<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut record = make_record("f1", "r1", 10_000);
    record.retry_count = 4;
    store.put(record).await.map_err(|e| e.to_string())?;

    let at = rfc3339_from_ms(12_000);
    store
        .mark_synced("f1", "r1", &at)
        .await
        .map_err(|e| e.to_string())?;
    let got = store
        .get("f1", "r1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("record missing")?;
    if got.synced_at.as_deref() != Some(at.as_str()) {
        return Err(format!("synced_at not stamped: {:?}", got.synced_at));
    }
    if got.retry_count != 0 {
        return Err(format!("retry_count not reset: {}", got.retry_count));
    }
    if !got.is_synced() {
        return Err("record still reports unsynced after mark_synced".to_string());
    }
    Ok(())
}

async fn mark_synced_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store
        .mark_synced("f1", "ghost", &rfc3339_from_ms(1_000))
        .await
    {
        Err(StoreError::NotFound { .. }) => Ok(()),
        Err(other) => Err(format!("expected NotFound, got {other}")),
        Ok(()) => Err("expected NotFound, got Ok".to_string()),
    }
}

async fn newer_local_write_makes_record_unsynced_again<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .put(make_record("f1", "r1", 10_000))
        .await
        .map_err(|e| e.to_string())?;
    store
        .mark_synced("f1", "r1", &rfc3339_from_ms(11_000))
        .await
        .map_err(|e| e.to_string())?;
    store
        .put(make_record("f1", "r1", 30_000))
        .await
        .map_err(|e| e.to_string())?;

    let got = store
        .get("f1", "r1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("record missing")?;
    if got.is_synced() {
        return Err("record with newer local write must report unsynced".to_string());
    }
    Ok(())
}
