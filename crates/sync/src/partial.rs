//! The partial-save service: a browser-local-style key-value copy for
//! near-instant resume, plus an optional direct push to the partials
//! endpoint guarded by its own minimum throttle.
//!
//! Entries live under keys of the form
//! `form-partial-{form_id}-{respondent_key}` and can be mirrored to a
//! single JSON file. When the mirror hits quota, entries are evicted
//! oldest first; entries older than the retention window are purged
//! opportunistically on every save.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use formrun_engine::{values_to_json, Clock, SessionSnapshot};
use formrun_store::{ms_from_rfc3339, rfc3339_from_ms};

use crate::remote::{PartialPayload, PartialReceipt, PartialRemote};

/// Minimum spacing between remote partial pushes.
const REMOTE_MIN_INTERVAL_MS: u64 = 2_000;

/// Entries older than this are purged.
const RETENTION_MS: u64 = 30 * 24 * 60 * 60 * 1_000;

/// Local quota, in entries. Oldest are evicted first when exceeded.
const DEFAULT_MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PartialEntry {
    snapshot: SessionSnapshot,
    updated_at_ms: u64,
}

/// Fast-resume store with optional remote push and resume-token loading.
pub struct PartialSaveService {
    form_id: String,
    clock: Arc<dyn Clock>,
    remote: Option<Arc<dyn PartialRemote>>,
    entries: Mutex<BTreeMap<String, PartialEntry>>,
    mirror_path: Option<PathBuf>,
    last_push_ms: AtomicU64,
    max_entries: usize,
}

impl PartialSaveService {
    pub fn new(form_id: &str, clock: Arc<dyn Clock>) -> Self {
        PartialSaveService {
            form_id: form_id.to_string(),
            clock,
            remote: None,
            entries: Mutex::new(BTreeMap::new()),
            mirror_path: None,
            last_push_ms: AtomicU64::new(0),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn PartialRemote>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Mirror entries to a JSON file, loading whatever it already holds.
    /// A corrupt mirror is discarded, never fatal.
    pub fn with_mirror(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, PartialEntry>>(&raw) {
                Ok(map) => *self.lock() = map,
                Err(e) => warn!(error = %e, "discarding corrupt partial-save mirror"),
            },
            Err(_) => {}
        }
        self.mirror_path = Some(path);
        self
    }

    /// Browser-local storage key for one respondent.
    pub fn local_key(&self, respondent_key: &str) -> String {
        format!("form-partial-{}-{}", self.form_id, respondent_key)
    }

    pub fn entry_count(&self) -> usize {
        self.lock().len()
    }

    // ── Local copy ───────────────────────────────────────────────────────────

    /// Store the snapshot locally (near-instant, no network).
    pub fn save(&self, snapshot: &SessionSnapshot) {
        let now = self.clock.now_ms();
        let key = self.local_key(&snapshot.respondent_key);
        {
            let mut entries = self.lock();
            purge_expired(&mut entries, now);
            entries.insert(
                key,
                PartialEntry {
                    snapshot: snapshot.clone(),
                    updated_at_ms: now,
                },
            );
            evict_over_quota(&mut entries, self.max_entries);
        }
        self.write_mirror();
    }

    pub fn load(&self, respondent_key: &str) -> Option<SessionSnapshot> {
        let key = self.local_key(respondent_key);
        self.lock().get(&key).map(|e| e.snapshot.clone())
    }

    /// The most recently saved snapshot for this form, any respondent.
    pub fn latest(&self) -> Option<SessionSnapshot> {
        self.lock()
            .values()
            .max_by_key(|e| e.updated_at_ms)
            .map(|e| e.snapshot.clone())
    }

    // ── Remote ───────────────────────────────────────────────────────────────

    /// Push one respondent's snapshot to the partials endpoint. Skipped
    /// (returning `None`) when within the minimum interval since the
    /// last push, when no remote is configured, or on failure; a push
    /// failure never surfaces past a log line.
    pub async fn push_remote(&self, respondent_key: &str) -> Option<PartialReceipt> {
        let remote = self.remote.clone()?;
        let now = self.clock.now_ms();
        let last = self.last_push_ms.load(Ordering::SeqCst);
        if last != 0 && now.saturating_sub(last) < REMOTE_MIN_INTERVAL_MS {
            debug!("partial push skipped: within minimum interval");
            return None;
        }

        let key = self.local_key(respondent_key);
        let snapshot = self.lock().get(&key).map(|e| e.snapshot.clone())?;
        self.last_push_ms.store(now, Ordering::SeqCst);

        let payload = PartialPayload {
            form_id: self.form_id.clone(),
            respondent_key: respondent_key.to_string(),
            values: values_to_json(&snapshot.values),
            current_step: snapshot.current_step,
            progress: snapshot.progress,
            started_at: rfc3339_from_ms(snapshot.started_at_ms),
            resume_token: snapshot.resume_token.clone(),
            metadata: snapshot.metadata.clone(),
        };
        match remote.push(&payload).await {
            Ok(receipt) => {
                if let Some(entry) = self.lock().get_mut(&key) {
                    entry.snapshot.resume_token = Some(receipt.resume_token.clone());
                }
                self.write_mirror();
                Some(receipt)
            }
            Err(e) => {
                warn!(error = %e, "partial push failed");
                None
            }
        }
    }

    /// Load an in-progress session by the `?resume=<token>` URL
    /// contract, independent of any local respondent key. The loaded
    /// snapshot is also cached locally.
    pub async fn load_by_token(&self, token: &str) -> Option<SessionSnapshot> {
        let remote = self.remote.clone()?;
        let payload = match remote.fetch(token).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "resume-token load failed");
                return None;
            }
        };
        let snapshot = SessionSnapshot {
            respondent_key: payload.respondent_key.clone(),
            values: formrun_engine::values_from_json(&payload.values),
            current_step: payload.current_step,
            progress: payload.progress,
            started_at_ms: ms_from_rfc3339(&payload.started_at).unwrap_or(0),
            resume_token: Some(token.to_string()),
            metadata: payload.metadata.clone(),
        };
        let key = self.local_key(&snapshot.respondent_key);
        let now = self.clock.now_ms();
        self.lock().insert(
            key,
            PartialEntry {
                snapshot: snapshot.clone(),
                updated_at_ms: now,
            },
        );
        self.write_mirror();
        Some(snapshot)
    }

    /// Forget one respondent's partial locally, and delete the
    /// server-side partial when a resume token is known.
    pub async fn clear(&self, respondent_key: &str) {
        let key = self.local_key(respondent_key);
        let removed = self.lock().remove(&key);
        self.write_mirror();
        if let (Some(entry), Some(remote)) = (removed, self.remote.clone()) {
            if let Some(token) = entry.snapshot.resume_token {
                if let Err(e) = remote.delete(&token).await {
                    warn!(error = %e, "server-side partial delete failed");
                }
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn write_mirror(&self) {
        let Some(path) = &self.mirror_path else {
            return;
        };
        let data = {
            let entries = self.lock();
            serde_json::to_vec_pretty(&*entries)
        };
        let data = match data {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "partial mirror serialize failed");
                return;
            }
        };
        if let Err(first) = std::fs::write(path, &data) {
            // Quota pressure: evict oldest and retry once.
            warn!(error = %first, "partial mirror write failed; evicting oldest");
            let retry_data = {
                let mut entries = self.lock();
                evict_oldest(&mut entries);
                serde_json::to_vec_pretty(&*entries)
            };
            if let Ok(retry_data) = retry_data {
                if let Err(second) = std::fs::write(path, &retry_data) {
                    warn!(error = %second, "partial mirror write failed after eviction");
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PartialEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn purge_expired(entries: &mut BTreeMap<String, PartialEntry>, now_ms: u64) {
    entries.retain(|_, e| now_ms.saturating_sub(e.updated_at_ms) <= RETENTION_MS);
}

fn evict_over_quota(entries: &mut BTreeMap<String, PartialEntry>, max: usize) {
    while entries.len() > max {
        evict_oldest(entries);
    }
}

fn evict_oldest(entries: &mut BTreeMap<String, PartialEntry>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, e)| e.updated_at_ms)
        .map(|(k, _)| k.clone());
    if let Some(key) = oldest {
        entries.remove(&key);
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use formrun_engine::ManualClock;
    use formrun_schema::FieldValue;

    use crate::remote::RemoteError;

    #[derive(Default)]
    struct FakePartialRemote {
        pushes: Mutex<Vec<PartialPayload>>,
        deletes: Mutex<Vec<String>>,
        stored: Mutex<BTreeMap<String, PartialPayload>>,
    }

    impl FakePartialRemote {
        fn push_count(&self) -> usize {
            self.pushes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PartialRemote for FakePartialRemote {
        async fn push(&self, payload: &PartialPayload) -> Result<PartialReceipt, RemoteError> {
            self.pushes.lock().unwrap().push(payload.clone());
            let token = format!("tok_{}", payload.respondent_key);
            self.stored
                .lock()
                .unwrap()
                .insert(token.clone(), payload.clone());
            Ok(PartialReceipt {
                id: "p_1".into(),
                resume_token: token,
                expires_at: None,
            })
        }

        async fn fetch(&self, token: &str) -> Result<Option<PartialPayload>, RemoteError> {
            Ok(self.stored.lock().unwrap().get(token).cloned())
        }

        async fn delete(&self, token: &str) -> Result<(), RemoteError> {
            self.deletes.lock().unwrap().push(token.to_string());
            self.stored.lock().unwrap().remove(token);
            Ok(())
        }
    }

    fn snapshot(key: &str, name: &str) -> SessionSnapshot {
        SessionSnapshot {
            respondent_key: key.to_string(),
            values: BTreeMap::from([(
                "name".to_string(),
                FieldValue::Text(name.to_string()),
            )]),
            current_step: 0,
            progress: 25.0,
            started_at_ms: 1_000,
            resume_token: None,
            metadata: None,
        }
    }

    #[test]
    fn local_key_format() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = PartialSaveService::new("f1", clock);
        assert_eq!(svc.local_key("r1"), "form-partial-f1-r1");
    }

    #[test]
    fn save_then_load_round_trips() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = PartialSaveService::new("f1", clock);
        svc.save(&snapshot("r1", "Ada"));
        let loaded = svc.load("r1").unwrap();
        assert_eq!(
            loaded.values.get("name"),
            Some(&FieldValue::Text("Ada".into()))
        );
        assert!(svc.load("nobody").is_none());
    }

    #[test]
    fn latest_picks_most_recent_save() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = PartialSaveService::new("f1", clock.clone());
        svc.save(&snapshot("r1", "older"));
        clock.advance(1_000);
        svc.save(&snapshot("r2", "newer"));
        assert_eq!(svc.latest().unwrap().respondent_key, "r2");
    }

    #[test]
    fn entries_past_retention_are_purged_on_save() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = PartialSaveService::new("f1", clock.clone());
        svc.save(&snapshot("stale", "x"));
        clock.advance(RETENTION_MS + 1);
        svc.save(&snapshot("fresh", "y"));
        assert!(svc.load("stale").is_none());
        assert!(svc.load("fresh").is_some());
    }

    #[tokio::test]
    async fn remote_pushes_respect_minimum_interval() {
        let clock = Arc::new(ManualClock::new(10_000));
        let remote = Arc::new(FakePartialRemote::default());
        let svc = PartialSaveService::new("f1", clock.clone()).with_remote(remote.clone());
        svc.save(&snapshot("r1", "Ada"));

        assert!(svc.push_remote("r1").await.is_some());
        assert_eq!(remote.push_count(), 1);

        clock.advance(500);
        assert!(svc.push_remote("r1").await.is_none());
        assert_eq!(remote.push_count(), 1);

        clock.advance(2_000);
        assert!(svc.push_remote("r1").await.is_some());
        assert_eq!(remote.push_count(), 2);
    }

    #[tokio::test]
    async fn push_stores_issued_resume_token() {
        let clock = Arc::new(ManualClock::new(10_000));
        let remote = Arc::new(FakePartialRemote::default());
        let svc = PartialSaveService::new("f1", clock).with_remote(remote);
        svc.save(&snapshot("r1", "Ada"));
        let receipt = svc.push_remote("r1").await.unwrap();
        assert_eq!(receipt.resume_token, "tok_r1");
        assert_eq!(svc.load("r1").unwrap().resume_token.as_deref(), Some("tok_r1"));
    }

    #[tokio::test]
    async fn load_by_token_fetches_and_caches_locally() {
        let clock = Arc::new(ManualClock::new(10_000));
        let remote = Arc::new(FakePartialRemote::default());
        let svc = PartialSaveService::new("f1", clock).with_remote(remote);
        svc.save(&snapshot("r1", "Ada"));
        svc.push_remote("r1").await.unwrap();

        // A different device: empty local state, token from the URL.
        let clock2 = Arc::new(ManualClock::new(20_000));
        let svc2 = PartialSaveService::new("f1", clock2)
            .with_remote(svc.remote.clone().unwrap());
        let restored = svc2.load_by_token("tok_r1").await.unwrap();
        assert_eq!(
            restored.values.get("name"),
            Some(&FieldValue::Text("Ada".into()))
        );
        assert_eq!(svc2.load("r1").unwrap().respondent_key, "r1");
        assert!(svc2.load_by_token("tok_unknown").await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_local_and_remote() {
        let clock = Arc::new(ManualClock::new(10_000));
        let remote = Arc::new(FakePartialRemote::default());
        let svc = PartialSaveService::new("f1", clock).with_remote(remote.clone());
        svc.save(&snapshot("r1", "Ada"));
        svc.push_remote("r1").await.unwrap();

        svc.clear("r1").await;
        assert!(svc.load("r1").is_none());
        assert_eq!(remote.deletes.lock().unwrap().as_slice(), ["tok_r1"]);
    }

    #[test]
    fn quota_evicts_oldest_first() {
        let clock = Arc::new(ManualClock::new(0));
        let mut svc = PartialSaveService::new("f1", clock.clone());
        svc.max_entries = 2;
        svc.save(&snapshot("first", "a"));
        clock.advance(1);
        svc.save(&snapshot("second", "b"));
        clock.advance(1);
        svc.save(&snapshot("third", "c"));
        assert_eq!(svc.entry_count(), 2);
        assert!(svc.load("first").is_none());
        assert!(svc.load("third").is_some());
    }

    #[test]
    fn mirror_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partials.json");
        let clock = Arc::new(ManualClock::new(0));
        {
            let svc = PartialSaveService::new("f1", clock.clone()).with_mirror(&path);
            svc.save(&snapshot("r1", "Ada"));
        }
        let svc = PartialSaveService::new("f1", clock).with_mirror(&path);
        assert_eq!(
            svc.load("r1").unwrap().values.get("name"),
            Some(&FieldValue::Text("Ada".into()))
        );
    }
}
