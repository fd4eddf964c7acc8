use std::future::Future;

use super::{make_record, TestResult};
use crate::SnapshotStore;

pub(super) async fn run_roundtrip_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "roundtrip",
        "put_then_get_returns_equal_record",
        put_then_get_returns_equal_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "roundtrip",
        "get_missing_returns_none",
        get_missing_returns_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "roundtrip",
        "put_same_key_overwrites",
        put_same_key_overwrites(factory).await,
    ));
    results.push(TestResult::from_result(
        "roundtrip",
        "records_of_other_forms_are_invisible",
        records_of_other_forms_are_invisible(factory).await,
    ));

    results
}

async fn put_then_get_returns_equal_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let record = make_record("f1", "r1", 10_000);
    store.put(record.clone()).await.map_err(|e| e.to_string())?;
    let got = store
        .get("f1", "r1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("record missing after put")?;
    if got != record {
        return Err(format!("round-trip mismatch: {:?} != {:?}", got, record));
    }
    Ok(())
}

async fn get_missing_returns_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.get("f1", "nobody").await.map_err(|e| e.to_string())? {
        None => Ok(()),
        Some(r) => Err(format!("expected None, got {:?}", r)),
    }
}

async fn put_same_key_overwrites<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut newer = make_record("f1", "r1", 20_000);
    newer.values = serde_json::json!({"name": "Grace"});
    newer.current_step = 2;
    store.put(newer.clone()).await.map_err(|e| e.to_string())?;

    let got = store
        .get("f1", "r1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("record missing")?;
    if got != newer {
        return Err("overwrite did not keep the newest record".to_string());
    }
    let all = store.list("f1").await.map_err(|e| e.to_string())?;
    if all.len() != 1 {
        return Err(format!("expected 1 record after overwrite, got {}", all.len()));
    }
    Ok(())
}

async fn records_of_other_forms_are_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .put(make_record("f2", "r1", 20_000))
        .await
        .map_err(|e| e.to_string())?;

    let f1 = store.list("f1").await.map_err(|e| e.to_string())?;
    if f1.len() != 1 || f1[0].form_id != "f1" {
        return Err("list leaked records across forms".to_string());
    }
    let latest = store
        .latest("f1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("latest missing")?;
    if latest.form_id != "f1" {
        return Err("latest leaked a record from another form".to_string());
    }
    Ok(())
}
