//! Offline persistence and background synchronization for Formrun
//! sessions.
//!
//! The engine stays I/O-free; everything that touches disk or network
//! lives here: the offline sync service owning a [`SnapshotStore`], the
//! partial-save service with resume tokens, the HTTP remote client, the
//! connectivity probe, and the batched analytics shipper. The runtime
//! module wires all of it to a [`formrun_engine::FormSession`].

pub mod analytics;
pub mod connectivity;
pub mod partial;
pub mod remote;
pub mod runtime;
pub mod service;

pub use analytics::{AnalyticsBatcher, AnalyticsEvent, EventSink, HttpEventSink};
pub use connectivity::{ConnectivityProbe, HttpProbe, StaticProbe};
pub use partial::PartialSaveService;
pub use remote::{
    HttpRemoteClient, PartialPayload, PartialReceipt, PartialRemote, RemoteError, RemoteSave,
};
pub use runtime::{build_session, parse_resume_token, PersistenceStack, SessionRuntime};
pub use service::{OfflineStats, OfflineSyncService, SyncConfig, SyncEvent};

pub use formrun_store::SnapshotStore;
