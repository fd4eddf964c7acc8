//! Trait seams between the engine and its collaborators: submission and
//! persistence. The engine sees only these traits; HTTP and storage
//! implementations live in the sync crate.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::state::SessionSnapshot;

/// The final submission payload.
#[derive(Debug, Clone, Serialize)]
pub struct FormSubmission {
    pub form_id: String,
    /// Block id -> plain JSON value.
    pub values: serde_json::Value,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub started_at: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub completed_at: String,
    pub metadata: serde_json::Value,
}

/// What the submission endpoint (or custom handler) returns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub id: Option<String>,
}

/// Submission failure. The session resets `is_submitting` and stays in
/// its last-filled state so the user can retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The endpoint answered outside 2xx.
    Rejected { status: u16 },
    /// Transport failure or a custom handler error.
    Failed(String),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Rejected { status } => {
                write!(f, "submission rejected with status {}", status)
            }
            SubmitError::Failed(message) => write!(f, "submission failed: {}", message),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Delivers a finished submission. The sync crate provides the default
/// HTTP implementation (`POST {api_url}/submissions`).
#[async_trait]
pub trait SubmitHandler: Send + Sync {
    async fn submit(&self, submission: &FormSubmission) -> Result<SubmissionReceipt, SubmitError>;
}

/// Persistence seam the session drives.
///
/// `save` is fire-and-forget: it stages the snapshot and returns
/// immediately so typing never blocks on I/O; the implementation owns
/// the debounce and the eventual durable write. Persistence failures
/// stay inside the implementation (logged, surfaced as status), never
/// as errors here.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    fn save(&self, snapshot: &SessionSnapshot);

    /// The snapshot to resume from, if any. Implementations with more
    /// than one tier return the freshest preferred source.
    async fn restore(&self) -> Option<SessionSnapshot>;

    /// Remove every stored trace of this respondent's session (called
    /// after successful final submission).
    async fn clear(&self, respondent_key: &str);
}

pub(crate) fn rfc3339_from_ms(ms: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

/// A submit handler for tests and headless runs: records submissions
/// and answers with a fixed result.
#[derive(Debug, Default)]
pub struct StaticSubmitHandler {
    pub fail_with: Option<SubmitError>,
    pub received: std::sync::Mutex<Vec<FormSubmission>>,
}

impl StaticSubmitHandler {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing(error: SubmitError) -> Self {
        StaticSubmitHandler {
            fail_with: Some(error),
            received: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn submissions(&self) -> Vec<FormSubmission> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SubmitHandler for StaticSubmitHandler {
    async fn submit(&self, submission: &FormSubmission) -> Result<SubmissionReceipt, SubmitError> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(submission.clone());
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(SubmissionReceipt {
                id: Some("sub_1".to_string()),
            }),
        }
    }
}

/// Build the submission metadata object from the config-level fields.
pub fn submission_metadata(
    locale: Option<&str>,
    respondent_key: &str,
    extra: Option<&serde_json::Value>,
) -> serde_json::Value {
    let mut map = BTreeMap::new();
    map.insert(
        "respondent_key".to_string(),
        serde_json::Value::String(respondent_key.to_string()),
    );
    if let Some(locale) = locale {
        map.insert(
            "locale".to_string(),
            serde_json::Value::String(locale.to_string()),
        );
    }
    if let Some(serde_json::Value::Object(extra)) = extra {
        for (k, v) in extra {
            map.insert(k.clone(), v.clone());
        }
    }
    serde_json::Value::Object(map.into_iter().collect())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_error_display() {
        assert_eq!(
            SubmitError::Rejected { status: 503 }.to_string(),
            "submission rejected with status 503"
        );
        assert_eq!(
            SubmitError::Failed("boom".into()).to_string(),
            "submission failed: boom"
        );
    }

    #[test]
    fn metadata_includes_respondent_key_and_locale() {
        let meta = submission_metadata(Some("en-US"), "r1", None);
        assert_eq!(meta["respondent_key"], "r1");
        assert_eq!(meta["locale"], "en-US");
    }

    #[tokio::test]
    async fn static_handler_records_submissions() {
        let handler = StaticSubmitHandler::succeeding();
        let submission = FormSubmission {
            form_id: "f1".into(),
            values: serde_json::json!({}),
            started_at: rfc3339_from_ms(0),
            completed_at: rfc3339_from_ms(1_000),
            metadata: serde_json::json!({}),
        };
        let receipt = handler.submit(&submission).await.unwrap();
        assert_eq!(receipt.id.as_deref(), Some("sub_1"));
        assert_eq!(handler.submissions().len(), 1);
    }
}
