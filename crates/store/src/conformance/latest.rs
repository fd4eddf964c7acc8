use std::future::Future;

use super::{make_record, TestResult};
use crate::SnapshotStore;

pub(super) async fn run_latest_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "latest",
        "latest_picks_most_recently_updated_across_keys",
        latest_picks_most_recently_updated_across_keys(factory).await,
    ));
    results.push(TestResult::from_result(
        "latest",
        "latest_on_empty_form_is_none",
        latest_on_empty_form_is_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "latest",
        "list_returns_all_respondents",
        list_returns_all_respondents(factory).await,
    ));

    results
}

async fn latest_picks_most_recently_updated_across_keys<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .put(make_record("f1", "older", 10_000))
        .await
        .map_err(|e| e.to_string())?;
    store
        .put(make_record("f1", "newest", 30_000))
        .await
        .map_err(|e| e.to_string())?;
    store
        .put(make_record("f1", "middle", 20_000))
        .await
        .map_err(|e| e.to_string())?;

    let latest = store
        .latest("f1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("latest missing")?;
    if latest.respondent_key != "newest" {
        return Err(format!(
            "latest picked '{}', expected 'newest'",
            latest.respondent_key
        ));
    }
    Ok(())
}

async fn latest_on_empty_form_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.latest("f1").await.map_err(|e| e.to_string())? {
        None => Ok(()),
        Some(r) => Err(format!("expected None, got {:?}", r)),
    }
}

async fn list_returns_all_respondents<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for (key, ms) in [("a", 1_000u64), ("b", 2_000), ("c", 3_000)] {
        store
            .put(make_record("f1", key, ms))
            .await
            .map_err(|e| e.to_string())?;
    }
    let mut keys: Vec<String> = store
        .list("f1")
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|r| r.respondent_key)
        .collect();
    keys.sort();
    if keys != ["a", "b", "c"] {
        return Err(format!("list returned {:?}", keys));
    }
    Ok(())
}
