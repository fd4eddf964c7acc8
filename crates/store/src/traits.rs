use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::SnapshotRecord;

/// The storage trait for Formrun session persistence backends.
///
/// A `SnapshotStore` durably persists session snapshots keyed by
/// `(form_id, respondent_key)` so that a session survives reloads and can
/// be resumed later. Writes are idempotent whole-record overwrites; there
/// is no partial-update surface, so backends need no transaction API.
///
/// ## Sync-timestamp preservation
///
/// `put` with `synced_at: None` MUST preserve an existing record's
/// `synced_at`: a local edit does not erase the fact that an earlier
/// version reached the server. A `put` carrying `Some(..)` overwrites.
///
/// ## Retention
///
/// `cleanup` purges only records carrying a `completed_at` timestamp older
/// than the age threshold. In-progress records are never auto-purged,
/// regardless of age: an abandoned-but-resumable session is never silently
/// lost.
///
/// ## Thread safety
///
/// Implementations must be `Send + Sync + 'static` so they can be shared
/// behind an `Arc` across the sync service's background tasks.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// Insert or overwrite the record for its `(form_id, respondent_key)`.
    async fn put(&self, record: SnapshotRecord) -> Result<(), StoreError>;

    /// Read one record. `Ok(None)` when absent.
    async fn get(
        &self,
        form_id: &str,
        respondent_key: &str,
    ) -> Result<Option<SnapshotRecord>, StoreError>;

    /// The most-recently-updated record for a form across all respondent
    /// keys. `Ok(None)` when the form has no records.
    async fn latest(&self, form_id: &str) -> Result<Option<SnapshotRecord>, StoreError>;

    /// All records for a form, in unspecified order.
    async fn list(&self, form_id: &str) -> Result<Vec<SnapshotRecord>, StoreError>;

    /// Remove every record for a form. Returns the number removed.
    async fn delete_all(&self, form_id: &str) -> Result<usize, StoreError>;

    /// Stamp a successful remote sync: sets `synced_at = at` and resets
    /// `retry_count`. Errors with [`StoreError::NotFound`] when absent.
    async fn mark_synced(
        &self,
        form_id: &str,
        respondent_key: &str,
        at: &str,
    ) -> Result<(), StoreError>;

    /// Stamp final submission: sets `completed_at = at`.
    /// Errors with [`StoreError::NotFound`] when absent.
    async fn mark_completed(
        &self,
        form_id: &str,
        respondent_key: &str,
        at: &str,
    ) -> Result<(), StoreError>;

    /// Purge completed records older than `max_age_ms` as of `now_ms`.
    /// Returns the number purged.
    async fn cleanup(
        &self,
        form_id: &str,
        max_age_ms: u64,
        now_ms: u64,
    ) -> Result<usize, StoreError>;
}
