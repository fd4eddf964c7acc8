use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A persisted snapshot of one respondent's in-progress (or completed)
/// session on one form.
///
/// At most one current record exists per `(form_id, respondent_key)`;
/// newer writes overwrite older ones for the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub form_id: String,
    /// Stable per-browser identifier, generated once and reused across
    /// reloads.
    pub respondent_key: String,
    /// Full answer map as a JSON object (block id -> value).
    pub values: serde_json::Value,
    pub current_step: usize,
    /// Percent complete at the time of the write.
    pub progress: f32,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub started_at: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
    /// Last successful remote sync. None if never synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<String>,
    /// Set when the session reached final submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Server-issued opaque id for URL-based resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    /// Consecutive failed remote-sync attempts.
    #[serde(default)]
    pub retry_count: u32,
    /// Arbitrary caller metadata (user agent, viewport, locale).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl SnapshotRecord {
    /// Composite storage key: `{form_id}-{respondent_key}`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.form_id, self.respondent_key)
    }

    pub fn updated_at_ms(&self) -> u64 {
        ms_from_rfc3339(&self.updated_at).unwrap_or(0)
    }

    /// True when the last local write has reached the remote endpoint.
    pub fn is_synced(&self) -> bool {
        match &self.synced_at {
            Some(synced) => {
                ms_from_rfc3339(synced).unwrap_or(0) >= self.updated_at_ms()
            }
            None => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Format a wall-clock millisecond timestamp as RFC 3339.
pub fn rfc3339_from_ms(ms: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

/// Parse an RFC 3339 timestamp back to wall-clock milliseconds.
pub fn ms_from_rfc3339(s: &str) -> Option<u64> {
    OffsetDateTime::parse(s, &Rfc3339)
        .ok()
        .map(|t| (t.unix_timestamp_nanos() / 1_000_000) as u64)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SnapshotRecord {
        SnapshotRecord {
            form_id: "f1".into(),
            respondent_key: "r1".into(),
            values: serde_json::json!({"name": "Ada"}),
            current_step: 2,
            progress: 50.0,
            started_at: rfc3339_from_ms(1_000),
            updated_at: rfc3339_from_ms(5_000),
            synced_at: None,
            completed_at: None,
            resume_token: None,
            retry_count: 0,
            metadata: None,
        }
    }

    #[test]
    fn timestamp_round_trip() {
        let ms = 1_700_000_123_456;
        assert_eq!(ms_from_rfc3339(&rfc3339_from_ms(ms)), Some(ms));
    }

    #[test]
    fn key_format() {
        assert_eq!(record().key(), "f1-r1");
    }

    #[test]
    fn sync_state() {
        let mut rec = record();
        assert!(!rec.is_synced());
        rec.synced_at = Some(rfc3339_from_ms(4_000));
        assert!(!rec.is_synced());
        rec.synced_at = Some(rfc3339_from_ms(5_000));
        assert!(rec.is_synced());
    }

    #[test]
    fn serde_defaults_for_optional_fields() {
        let json = serde_json::json!({
            "form_id": "f1",
            "respondent_key": "r1",
            "values": {},
            "current_step": 0,
            "progress": 0.0,
            "started_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        });
        let rec: SnapshotRecord = serde_json::from_value(json).unwrap();
        assert_eq!(rec.synced_at, None);
        assert_eq!(rec.retry_count, 0);
        assert!(!rec.is_completed());
    }
}
