use std::future::Future;

use super::{make_record, TestResult};
use crate::SnapshotStore;

pub(super) async fn run_delete_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "delete",
        "delete_all_then_get_returns_none",
        delete_all_then_get_returns_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "delete",
        "delete_all_counts_and_spares_other_forms",
        delete_all_counts_and_spares_other_forms(factory).await,
    ));
    results.push(TestResult::from_result(
        "delete",
        "delete_all_on_empty_form_is_zero",
        delete_all_on_empty_form_is_zero(factory).await,
    ));

    results
}

async fn delete_all_then_get_returns_none<S, F, Fut>(factory: &F) -> Result<(), String>
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
    store.delete_all("f1").await.map_err(|e| e.to_string())?;
    match store.get("f1", "r1").await.map_err(|e| e.to_string())? {
        None => Ok(()),
        Some(_) => Err("record survived delete_all".to_string()),
    }
}

async fn delete_all_counts_and_spares_other_forms<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .put(make_record("f1", "a", 1_000))
        .await
        .map_err(|e| e.to_string())?;
    store
        .put(make_record("f1", "b", 2_000))
        .await
        .map_err(|e| e.to_string())?;
    store
        .put(make_record("f2", "a", 3_000))
        .await
        .map_err(|e| e.to_string())?;

    let removed = store.delete_all("f1").await.map_err(|e| e.to_string())?;
    if removed != 2 {
        return Err(format!("expected 2 removed, got {removed}"));
    }
    if store
        .get("f2", "a")
        .await
        .map_err(|e| e.to_string())?
        .is_none()
    {
        return Err("delete_all removed another form's record".to_string());
    }
    Ok(())
}

async fn delete_all_on_empty_form_is_zero<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let removed = store.delete_all("f1").await.map_err(|e| e.to_string())?;
    if removed != 0 {
        return Err(format!("expected 0 removed, got {removed}"));
    }
    Ok(())
}
