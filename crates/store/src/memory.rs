use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::{ms_from_rfc3339, SnapshotRecord};
use crate::traits::SnapshotStore;

/// In-memory snapshot store.
///
/// Backs tests and embedded/headless sessions where durability across
/// process restarts is not needed. The map is keyed by the composite
/// `{form_id}-{respondent_key}` key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, SnapshotRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, SnapshotRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn put(&self, mut record: SnapshotRecord) -> Result<(), StoreError> {
        let mut map = self.lock();
        let key = record.key();
        if record.synced_at.is_none() {
            if let Some(existing) = map.get(&key) {
                record.synced_at = existing.synced_at.clone();
            }
        }
        map.insert(key, record);
        Ok(())
    }

    async fn get(
        &self,
        form_id: &str,
        respondent_key: &str,
    ) -> Result<Option<SnapshotRecord>, StoreError> {
        let key = format!("{}-{}", form_id, respondent_key);
        Ok(self.lock().get(&key).cloned())
    }

    async fn latest(&self, form_id: &str) -> Result<Option<SnapshotRecord>, StoreError> {
        Ok(self
            .lock()
            .values()
            .filter(|r| r.form_id == form_id)
            .max_by_key(|r| r.updated_at_ms())
            .cloned())
    }

    async fn list(&self, form_id: &str) -> Result<Vec<SnapshotRecord>, StoreError> {
        Ok(self
            .lock()
            .values()
            .filter(|r| r.form_id == form_id)
            .cloned()
            .collect())
    }

    async fn delete_all(&self, form_id: &str) -> Result<usize, StoreError> {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, r| r.form_id != form_id);
        Ok(before - map.len())
    }

    async fn mark_synced(
        &self,
        form_id: &str,
        respondent_key: &str,
        at: &str,
    ) -> Result<(), StoreError> {
        let key = format!("{}-{}", form_id, respondent_key);
        let mut map = self.lock();
        match map.get_mut(&key) {
            Some(record) => {
                record.synced_at = Some(at.to_string());
                record.retry_count = 0;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                form_id: form_id.to_string(),
                respondent_key: respondent_key.to_string(),
            }),
        }
    }

    async fn mark_completed(
        &self,
        form_id: &str,
        respondent_key: &str,
        at: &str,
    ) -> Result<(), StoreError> {
        let key = format!("{}-{}", form_id, respondent_key);
        let mut map = self.lock();
        match map.get_mut(&key) {
            Some(record) => {
                record.completed_at = Some(at.to_string());
                Ok(())
            }
            None => Err(StoreError::NotFound {
                form_id: form_id.to_string(),
                respondent_key: respondent_key.to_string(),
            }),
        }
    }

    async fn cleanup(
        &self,
        form_id: &str,
        max_age_ms: u64,
        now_ms: u64,
    ) -> Result<usize, StoreError> {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, r| {
            if r.form_id != form_id {
                return true;
            }
            match r.completed_at.as_deref().and_then(ms_from_rfc3339) {
                Some(completed_ms) => now_ms.saturating_sub(completed_ms) <= max_age_ms,
                None => true,
            }
        });
        Ok(before - map.len())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn memory_store_conformance() {
        let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
        assert_eq!(report.failed, 0, "{report}");
    }
}
