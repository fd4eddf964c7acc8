use std::future::Future;

use super::{make_record, TestResult};
use crate::record::rfc3339_from_ms;
use crate::SnapshotStore;

pub(super) async fn run_cleanup_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "cleanup",
        "purges_only_completed_records_past_max_age",
        purges_only_completed_records_past_max_age(factory).await,
    ));
    results.push(TestResult::from_result(
        "cleanup",
        "incomplete_record_of_same_age_is_retained",
        incomplete_record_of_same_age_is_retained(factory).await,
    ));
    results.push(TestResult::from_result(
        "cleanup",
        "fresh_completed_record_is_retained",
        fresh_completed_record_is_retained(factory).await,
    ));

    results
}

async fn purges_only_completed_records_past_max_age<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut old_completed = make_record("f1", "done", 10_000);
    old_completed.completed_at = Some(rfc3339_from_ms(10_000));
    store.put(old_completed).await.map_err(|e| e.to_string())?;
    store
        .put(make_record("f1", "in-progress", 10_000))
        .await
        .map_err(|e| e.to_string())?;

    let removed = store
        .cleanup("f1", 60_000, 100_000)
        .await
        .map_err(|e| e.to_string())?;
    if removed != 1 {
        return Err(format!("expected 1 purged, got {removed}"));
    }
    if store
        .get("f1", "done")
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err("aged completed record survived cleanup".to_string());
    }
    if store
        .get("f1", "in-progress")
        .await
        .map_err(|e| e.to_string())?
        .is_none()
    {
        return Err("in-progress record was purged".to_string());
    }
    Ok(())
}

async fn incomplete_record_of_same_age_is_retained<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .put(make_record("f1", "abandoned", 0))
        .await
        .map_err(|e| e.to_string())?;

    // A year of age, still incomplete: never auto-purged.
    let removed = store
        .cleanup("f1", 60_000, 31_536_000_000)
        .await
        .map_err(|e| e.to_string())?;
    if removed != 0 {
        return Err(format!("expected 0 purged, got {removed}"));
    }
    if store
        .get("f1", "abandoned")
        .await
        .map_err(|e| e.to_string())?
        .is_none()
    {
        return Err("abandoned-but-resumable record was lost".to_string());
    }
    Ok(())
}

async fn fresh_completed_record_is_retained<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut rec = make_record("f1", "just-done", 90_000);
    rec.completed_at = Some(rfc3339_from_ms(90_000));
    store.put(rec).await.map_err(|e| e.to_string())?;

    let removed = store
        .cleanup("f1", 60_000, 100_000)
        .await
        .map_err(|e| e.to_string())?;
    if removed != 0 {
        return Err(format!("expected 0 purged, got {removed}"));
    }
    Ok(())
}
