/// All errors that can be returned by a SnapshotStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No snapshot exists for the given (form_id, respondent_key).
    #[error("snapshot not found: {form_id}/{respondent_key}")]
    NotFound {
        form_id: String,
        respondent_key: String,
    },

    /// Stored data could not be decoded. Callers treat the record as
    /// absent; the session must keep working.
    #[error("corrupt snapshot data: {0}")]
    Corrupt(String),

    /// Filesystem-level failure (permissions, quota, missing directory).
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Snapshot (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// A backend-specific storage error.
    #[error("storage backend error: {0}")]
    Backend(String),
}
