use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use crate::error::StoreError;
use crate::record::{ms_from_rfc3339, SnapshotRecord};
use crate::traits::SnapshotStore;

/// File-backed snapshot store: one JSON file per form under a root
/// directory, holding the respondent-key -> record map.
///
/// Writes go to a temp file and rename into place so a crash mid-write
/// never corrupts the previous snapshot. A file that fails to decode is
/// treated as absent (logged, never fatal): a corrupted entry must not
/// block the fill-in experience.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(JsonFileStore { root })
    }

    fn form_path(&self, form_id: &str) -> PathBuf {
        let safe: String = form_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{}.json", safe))
    }

    fn load(&self, form_id: &str) -> Result<BTreeMap<String, SnapshotRecord>, StoreError> {
        let path = self.form_path(form_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        match serde_json::from_str(&raw) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(form_id, error = %e, "discarding corrupt snapshot file");
                Ok(BTreeMap::new())
            }
        }
    }

    fn save(
        &self,
        form_id: &str,
        map: &BTreeMap<String, SnapshotRecord>,
    ) -> Result<(), StoreError> {
        let path = self.form_path(form_id);
        let tmp = path.with_extension("json.tmp");
        let data =
            serde_json::to_vec_pretty(map).map_err(|e| StoreError::Serialize(e.to_string()))?;
        fs::write(&tmp, data).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn put(&self, mut record: SnapshotRecord) -> Result<(), StoreError> {
        let mut map = self.load(&record.form_id)?;
        if record.synced_at.is_none() {
            if let Some(existing) = map.get(&record.respondent_key) {
                record.synced_at = existing.synced_at.clone();
            }
        }
        let form_id = record.form_id.clone();
        map.insert(record.respondent_key.clone(), record);
        self.save(&form_id, &map)
    }

    async fn get(
        &self,
        form_id: &str,
        respondent_key: &str,
    ) -> Result<Option<SnapshotRecord>, StoreError> {
        Ok(self.load(form_id)?.get(respondent_key).cloned())
    }

    async fn latest(&self, form_id: &str) -> Result<Option<SnapshotRecord>, StoreError> {
        Ok(self
            .load(form_id)?
            .into_values()
            .max_by_key(|r| r.updated_at_ms()))
    }

    async fn list(&self, form_id: &str) -> Result<Vec<SnapshotRecord>, StoreError> {
        Ok(self.load(form_id)?.into_values().collect())
    }

    async fn delete_all(&self, form_id: &str) -> Result<usize, StoreError> {
        let count = self.load(form_id)?.len();
        match fs::remove_file(self.form_path(form_id)) {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    async fn mark_synced(
        &self,
        form_id: &str,
        respondent_key: &str,
        at: &str,
    ) -> Result<(), StoreError> {
        let mut map = self.load(form_id)?;
        let record = map
            .get_mut(respondent_key)
            .ok_or_else(|| StoreError::NotFound {
                form_id: form_id.to_string(),
                respondent_key: respondent_key.to_string(),
            })?;
        record.synced_at = Some(at.to_string());
        record.retry_count = 0;
        self.save(form_id, &map)
    }

    async fn mark_completed(
        &self,
        form_id: &str,
        respondent_key: &str,
        at: &str,
    ) -> Result<(), StoreError> {
        let mut map = self.load(form_id)?;
        let record = map
            .get_mut(respondent_key)
            .ok_or_else(|| StoreError::NotFound {
                form_id: form_id.to_string(),
                respondent_key: respondent_key.to_string(),
            })?;
        record.completed_at = Some(at.to_string());
        self.save(form_id, &map)
    }

    async fn cleanup(
        &self,
        form_id: &str,
        max_age_ms: u64,
        now_ms: u64,
    ) -> Result<usize, StoreError> {
        let mut map = self.load(form_id)?;
        let before = map.len();
        map.retain(|_, r| {
            match r.completed_at.as_deref().and_then(ms_from_rfc3339) {
                Some(completed_ms) => now_ms.saturating_sub(completed_ms) <= max_age_ms,
                None => true,
            }
        });
        let removed = before - map.len();
        if removed > 0 {
            self.save(form_id, &map)?;
        }
        Ok(removed)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;
    use crate::record::rfc3339_from_ms;

    #[tokio::test]
    async fn file_store_conformance() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let counter = std::sync::atomic::AtomicUsize::new(0);
        let report = run_conformance_suite(|| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let sub = root.join(format!("case-{n}"));
            async move { JsonFileStore::new(sub).unwrap() }
        })
        .await;
        assert_eq!(report.failed, 0, "{report}");
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        fs::write(dir.path().join("f1.json"), b"{ not json").unwrap();
        assert!(store.get("f1", "r1").await.unwrap().is_none());
        // A write over the corrupt file recovers the form.
        store
            .put(SnapshotRecord {
                form_id: "f1".into(),
                respondent_key: "r1".into(),
                values: serde_json::json!({}),
                current_step: 0,
                progress: 0.0,
                started_at: rfc3339_from_ms(0),
                updated_at: rfc3339_from_ms(0),
                synced_at: None,
                completed_at: None,
                resume_token: None,
                retry_count: 0,
                metadata: None,
            })
            .await
            .unwrap();
        assert!(store.get("f1", "r1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn form_ids_with_path_separators_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        let path = store.form_path("../evil/form");
        assert!(path.starts_with(dir.path()));
        assert_eq!(path.file_name().unwrap(), "___evil_form.json");
    }
}
