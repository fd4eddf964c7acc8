//! Wires a [`FormSession`] to the full persistence and delivery stack:
//! partial saves for instant resume, the offline sync service for
//! durable storage and background push, the HTTP client for submission,
//! and the analytics batcher.

use std::sync::Arc;

use formrun_engine::{
    Clock, FormSession, RuntimeConfig, SessionPersistence, SessionSnapshot, SystemClock,
};
use formrun_schema::FormSchema;
use formrun_store::{ms_from_rfc3339, SnapshotRecord, SnapshotStore};

use async_trait::async_trait;

use crate::analytics::{AnalyticsBatcher, HttpEventSink};
use crate::connectivity::HttpProbe;
use crate::partial::PartialSaveService;
use crate::remote::HttpRemoteClient;
use crate::service::{OfflineSyncService, SyncConfig};

/// Everything a hosting shell needs to drive one form session.
pub struct SessionRuntime {
    pub session: FormSession,
    pub sync: Arc<OfflineSyncService>,
    pub partial: Arc<PartialSaveService>,
    pub analytics: Option<Arc<AnalyticsBatcher>>,
}

/// The two persistence tiers behind the engine's seam. Resume prefers
/// the partial-save copy (instant) over the durable store.
pub struct PersistenceStack {
    sync: Arc<OfflineSyncService>,
    partial: Arc<PartialSaveService>,
}

impl PersistenceStack {
    pub fn new(sync: Arc<OfflineSyncService>, partial: Arc<PartialSaveService>) -> Self {
        PersistenceStack { sync, partial }
    }
}

#[async_trait]
impl SessionPersistence for PersistenceStack {
    fn save(&self, snapshot: &SessionSnapshot) {
        self.partial.save(snapshot);
        self.sync.save_state(snapshot);
    }

    async fn restore(&self) -> Option<SessionSnapshot> {
        if let Some(snapshot) = self.partial.latest() {
            return Some(snapshot);
        }
        self.sync.restore().await.map(record_to_snapshot)
    }

    async fn clear(&self, respondent_key: &str) {
        self.partial.clear(respondent_key).await;
        self.sync.delete_all().await;
    }
}

pub(crate) fn record_to_snapshot(record: SnapshotRecord) -> SessionSnapshot {
    SessionSnapshot {
        respondent_key: record.respondent_key,
        values: formrun_engine::values_from_json(&record.values),
        current_step: record.current_step,
        progress: record.progress,
        started_at_ms: ms_from_rfc3339(&record.started_at).unwrap_or(0),
        resume_token: record.resume_token,
        metadata: record.metadata,
    }
}

/// Extract the opaque resume token from a page URL's `resume` query
/// parameter.
pub fn parse_resume_token(url: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("resume=") {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Assemble the full runtime for one form: storage, sync loops, partial
/// saves, submission, analytics, then resume (URL token first, then the
/// freshest persisted snapshot).
pub async fn build_session(
    schema: FormSchema,
    config: RuntimeConfig,
    store: Arc<dyn SnapshotStore>,
    resume_token: Option<&str>,
) -> SessionRuntime {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let client = config
        .api_url
        .as_deref()
        .map(|url| Arc::new(HttpRemoteClient::new(url)));

    let mut partial = PartialSaveService::new(&config.form_id, clock.clone());
    if let Some(client) = &client {
        partial = partial.with_remote(client.clone());
    }
    let partial = Arc::new(partial);

    let mut sync = OfflineSyncService::new(
        SyncConfig::from_runtime(&config),
        store,
        clock.clone(),
    );
    if let Some(client) = &client {
        sync = sync
            .with_remote(client.clone())
            .with_probe(Arc::new(HttpProbe::new(client.api_url())));
    }
    let sync = Arc::new(sync);
    if config.enable_offline {
        sync.start();
    }

    if let Some(token) = resume_token {
        partial.load_by_token(token).await;
    }

    let analytics = if config.enable_analytics {
        config
            .analytics_api_url
            .as_deref()
            .map(|url| Arc::new(AnalyticsBatcher::new(Arc::new(HttpEventSink::new(url)), 20)))
    } else {
        None
    };

    let stack = Arc::new(PersistenceStack {
        sync: sync.clone(),
        partial: partial.clone(),
    });
    let mut session =
        FormSession::new(schema, config, clock).with_persistence(stack);
    if let Some(client) = client {
        session = session.with_submit_handler(client);
    }
    session.restore_from_saved().await;

    SessionRuntime {
        session,
        sync,
        partial,
        analytics,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
