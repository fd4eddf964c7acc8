//! The offline sync service: debounced local persistence plus throttled
//! background push to a remote endpoint.
//!
//! Two independent windows exist and are never conflated: the local-save
//! debounce (short, keeps the durable store fresh) and the remote-sync
//! throttle (longer, keeps a flaky network from seeing every keystroke).
//! A save is a full-snapshot idempotent overwrite, so the latest state
//! always wins and nothing needs merging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use formrun_engine::{values_to_json, Clock, Debouncer, RuntimeConfig, SessionSnapshot};
use formrun_store::{rfc3339_from_ms, SnapshotRecord, SnapshotStore};

use crate::connectivity::ConnectivityProbe;
use crate::remote::RemoteSave;

/// Background loop granularity. The debouncer owns the actual windows.
const TICK_MS: u64 = 250;

/// Timer windows for one service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub form_id: String,
    /// Local-save debounce window.
    pub auto_save_interval_ms: u64,
    /// Remote-push throttle window, independent of the save window.
    pub sync_interval_ms: u64,
    /// Connectivity polling fallback interval.
    pub connectivity_poll_ms: u64,
}

impl SyncConfig {
    pub fn from_runtime(config: &RuntimeConfig) -> Self {
        SyncConfig {
            form_id: config.form_id.clone(),
            auto_save_interval_ms: config.auto_save_interval_ms,
            sync_interval_ms: config.sync_interval_ms,
            connectivity_poll_ms: config.connectivity_poll_ms,
        }
    }
}

/// Non-blocking status notifications for UI indicators.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Saved { respondent_key: String },
    Restored { respondent_key: String },
    Synced { respondent_key: String },
    SyncFailed { message: String },
    Online,
    Offline,
}

/// Store totals for the "offline" status indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineStats {
    pub total: usize,
    pub unsynced: usize,
    /// `updated_at` of the oldest unsynced record.
    pub oldest_unsynced: Option<String>,
}

/// Owns the durable store for one form and keeps the freshest snapshot
/// flowing to it locally and to the remote endpoint eventually.
pub struct OfflineSyncService {
    config: SyncConfig,
    store: Arc<dyn SnapshotStore>,
    remote: Option<Arc<dyn RemoteSave>>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    clock: Arc<dyn Clock>,
    pending: Mutex<Debouncer<SnapshotRecord>>,
    online: AtomicBool,
    syncing: AtomicBool,
    destroyed: AtomicBool,
    senders: Mutex<Vec<UnboundedSender<SyncEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineSyncService {
    pub fn new(config: SyncConfig, store: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>) -> Self {
        let pending = Debouncer::new(config.auto_save_interval_ms);
        OfflineSyncService {
            config,
            store,
            remote: None,
            probe: None,
            clock,
            pending: Mutex::new(pending),
            online: AtomicBool::new(true),
            syncing: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            senders: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteSave>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn subscribe(&self) -> UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock(&self.senders).push(tx);
        rx
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    // ── Public operations ────────────────────────────────────────────────────

    /// Stage a snapshot for the debounced local write. Calls within the
    /// auto-save window collapse to a single write of the latest state.
    pub fn save_state(&self, snapshot: &SessionSnapshot) {
        let now = self.clock.now_ms();
        let record = self.record_from_snapshot(snapshot, now);
        self.lock(&self.pending).offer(record, now);
    }

    /// The most-recently-updated snapshot for this form, across all
    /// respondent keys. Emits `Restored` when one exists.
    pub async fn restore(&self) -> Option<SnapshotRecord> {
        match self.store.latest(&self.config.form_id).await {
            Ok(Some(record)) => {
                self.emit(SyncEvent::Restored {
                    respondent_key: record.respondent_key.clone(),
                });
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "restore failed; starting fresh");
                None
            }
        }
    }

    /// Remove all snapshots for this form (after successful submission).
    pub async fn delete_all(&self) {
        self.lock(&self.pending).flush();
        if let Err(e) = self.store.delete_all(&self.config.form_id).await {
            warn!(error = %e, "delete_all failed");
        }
    }

    /// True iff a staged write exists or any stored record has local
    /// changes newer than its last sync.
    pub async fn has_unsynced(&self) -> bool {
        if self.lock(&self.pending).is_pending() {
            return true;
        }
        match self.store.list(&self.config.form_id).await {
            Ok(records) => records.iter().any(|r| !r.is_synced()),
            Err(_) => false,
        }
    }

    pub async fn offline_stats(&self) -> OfflineStats {
        let records = self
            .store
            .list(&self.config.form_id)
            .await
            .unwrap_or_default();
        let unsynced: Vec<&SnapshotRecord> =
            records.iter().filter(|r| !r.is_synced()).collect();
        OfflineStats {
            total: records.len(),
            unsynced: unsynced.len(),
            oldest_unsynced: unsynced
                .iter()
                .min_by_key(|r| r.updated_at_ms())
                .map(|r| r.updated_at.clone()),
        }
    }

    /// Purge completed records older than `max_age_ms`. In-progress
    /// records are never auto-purged.
    pub async fn cleanup(&self, max_age_ms: u64) -> usize {
        let now = self.clock.now_ms();
        match self.store.cleanup(&self.config.form_id, max_age_ms, now).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "cleanup failed");
                0
            }
        }
    }

    /// Flip the connectivity flag. Reconnecting triggers an immediate
    /// sync attempt; going offline suspends remote pushes (local writes
    /// continue).
    pub async fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if !was && online {
            self.emit(SyncEvent::Online);
            self.sync_now().await;
        } else if was && !online {
            self.emit(SyncEvent::Offline);
        }
    }

    /// One immediate sync attempt, subject only to the in-flight guard.
    pub async fn sync_now(&self) {
        self.flush_pending_at(None).await;
        self.sync_tick().await;
    }

    /// Stop all background tasks and flush the staged write. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        for task in self.lock(&self.tasks).drain(..) {
            task.abort();
        }
        let staged = self.lock(&self.pending).flush();
        if let Some(record) = staged {
            self.write(record).await;
        }
    }

    // ── Background loops ─────────────────────────────────────────────────────

    /// Spawn the save-flush, periodic-sync, and connectivity-poll loops.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.lock(&self.tasks);

        let svc = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(TICK_MS));
            loop {
                tick.tick().await;
                if svc.destroyed.load(Ordering::SeqCst) {
                    break;
                }
                svc.flush_pending().await;
            }
        }));

        let svc = Arc::clone(self);
        let sync_every = Duration::from_millis(svc.config.sync_interval_ms.max(TICK_MS));
        tasks.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(sync_every);
            loop {
                tick.tick().await;
                if svc.destroyed.load(Ordering::SeqCst) {
                    break;
                }
                if svc.is_online() {
                    svc.sync_tick().await;
                }
            }
        }));

        if let Some(probe) = self.probe.clone() {
            let svc = Arc::clone(self);
            let poll_every = Duration::from_millis(svc.config.connectivity_poll_ms.max(TICK_MS));
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(poll_every);
                loop {
                    tick.tick().await;
                    if svc.destroyed.load(Ordering::SeqCst) {
                        break;
                    }
                    let online = probe.is_online().await;
                    svc.set_online(online).await;
                }
            }));
        }
    }

    // ── Internals (public to the crate's tests) ──────────────────────────────

    /// Write the staged snapshot if its debounce window has elapsed.
    pub async fn flush_pending(&self) {
        let now = self.clock.now_ms();
        self.flush_pending_at(Some(now)).await;
    }

    async fn flush_pending_at(&self, now: Option<u64>) {
        let staged = {
            let mut pending = self.lock(&self.pending);
            match now {
                Some(now) => pending.poll(now),
                None => pending.flush(),
            }
        };
        if let Some(record) = staged {
            self.write(record).await;
        }
    }

    /// Push the most recent unsynced record, if online and no push is
    /// already in flight. A request arriving mid-flight is dropped, not
    /// queued; the next periodic tick picks up the latest state anyway.
    pub async fn sync_tick(&self) {
        if self.destroyed.load(Ordering::SeqCst) || !self.is_online() {
            return;
        }
        let Some(remote) = self.remote.clone() else {
            return;
        };
        if self.syncing.swap(true, Ordering::SeqCst) {
            debug!("sync throttled: push already in flight");
            return;
        }

        let candidate = match self.store.list(&self.config.form_id).await {
            Ok(records) => records
                .into_iter()
                .filter(|r| !r.is_synced())
                .max_by_key(|r| r.updated_at_ms()),
            Err(e) => {
                warn!(error = %e, "sync skipped: store list failed");
                None
            }
        };

        if let Some(record) = candidate {
            match remote.save(&record).await {
                Ok(()) => {
                    let at = rfc3339_from_ms(self.clock.now_ms());
                    if let Err(e) = self
                        .store
                        .mark_synced(&record.form_id, &record.respondent_key, &at)
                        .await
                    {
                        warn!(error = %e, "mark_synced failed");
                    }
                    self.emit(SyncEvent::Synced {
                        respondent_key: record.respondent_key.clone(),
                    });
                }
                Err(e) => {
                    self.bump_retry(&record).await;
                    self.emit(SyncEvent::SyncFailed {
                        message: e.to_string(),
                    });
                    debug!(error = %e, "remote sync failed; will retry on next tick");
                }
            }
        }
        self.syncing.store(false, Ordering::SeqCst);
    }

    async fn bump_retry(&self, record: &SnapshotRecord) {
        let mut bumped = record.clone();
        bumped.retry_count += 1;
        if let Err(e) = self.store.put(bumped).await {
            warn!(error = %e, "retry bump failed");
        }
    }

    /// Durable write with one cleanup-and-retry on failure. A write that
    /// still fails is logged and dropped; filling the form must never
    /// block on persistence.
    async fn write(&self, record: SnapshotRecord) {
        let respondent_key = record.respondent_key.clone();
        if let Err(first) = self.store.put(record.clone()).await {
            warn!(error = %first, "snapshot write failed; evicting completed records and retrying");
            let now = self.clock.now_ms();
            let _ = self.store.cleanup(&self.config.form_id, 0, now).await;
            if let Err(second) = self.store.put(record).await {
                warn!(error = %second, "snapshot write failed after cleanup; dropping");
                return;
            }
        }
        self.emit(SyncEvent::Saved { respondent_key });
    }

    fn record_from_snapshot(&self, snapshot: &SessionSnapshot, now_ms: u64) -> SnapshotRecord {
        SnapshotRecord {
            form_id: self.config.form_id.clone(),
            respondent_key: snapshot.respondent_key.clone(),
            values: values_to_json(&snapshot.values),
            current_step: snapshot.current_step,
            progress: snapshot.progress,
            started_at: rfc3339_from_ms(snapshot.started_at_ms),
            updated_at: rfc3339_from_ms(now_ms),
            synced_at: None,
            completed_at: None,
            resume_token: snapshot.resume_token.clone(),
            retry_count: 0,
            metadata: snapshot.metadata.clone(),
        }
    }

    fn emit(&self, event: SyncEvent) {
        self.lock(&self.senders)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
