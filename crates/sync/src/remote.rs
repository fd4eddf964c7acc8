//! HTTP remote client for submissions and partial saves.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. Endpoints follow the product API:
//! `POST {api}/submissions`, `POST/GET/DELETE {api}/partials[/{token}]`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use formrun_engine::{FormSubmission, SubmissionReceipt, SubmitError, SubmitHandler};
use formrun_store::SnapshotRecord;

/// Errors from the remote endpoints.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// The endpoint answered outside 2xx.
    #[error("remote endpoint answered status {code}")]
    Status { code: u16 },

    /// Connection-level failure (DNS, refused, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not the expected JSON.
    #[error("response decode error: {0}")]
    Decode(String),
}

/// Body of a partial-save push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialPayload {
    pub form_id: String,
    pub respondent_key: String,
    pub values: serde_json::Value,
    pub current_step: usize,
    pub progress: f32,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// What the partials endpoint returns on a successful push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialReceipt {
    pub id: String,
    pub resume_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// The caller-supplied remote-save callback the offline sync service
/// pushes unsynced snapshots through.
#[async_trait]
pub trait RemoteSave: Send + Sync {
    async fn save(&self, record: &SnapshotRecord) -> Result<(), RemoteError>;
}

/// Remote operations of the partial-save service.
#[async_trait]
pub trait PartialRemote: Send + Sync {
    async fn push(&self, payload: &PartialPayload) -> Result<PartialReceipt, RemoteError>;
    async fn fetch(&self, token: &str) -> Result<Option<PartialPayload>, RemoteError>;
    async fn delete(&self, token: &str) -> Result<(), RemoteError>;
}

/// The production client against the product API.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    api_url: String,
}

impl HttpRemoteClient {
    pub fn new(api_url: &str) -> Self {
        HttpRemoteClient {
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }
}

fn map_ureq_error(e: ureq::Error) -> RemoteError {
    match e {
        ureq::Error::StatusCode(code) => RemoteError::Status { code },
        other => RemoteError::Transport(other.to_string()),
    }
}

async fn post_json<T: for<'de> Deserialize<'de> + Send + 'static>(
    url: String,
    body: serde_json::Value,
) -> Result<T, RemoteError> {
    tokio::task::spawn_blocking(move || {
        let agent = ureq::Agent::new_with_defaults();
        let response = agent.post(&url).send_json(&body).map_err(map_ureq_error)?;
        response
            .into_body()
            .read_json::<T>()
            .map_err(|e| RemoteError::Decode(e.to_string()))
    })
    .await
    .map_err(|e| RemoteError::Transport(format!("task join error: {}", e)))?
}

#[async_trait]
impl SubmitHandler for HttpRemoteClient {
    async fn submit(&self, submission: &FormSubmission) -> Result<SubmissionReceipt, SubmitError> {
        let url = self.endpoint("submissions");
        let body = serde_json::to_value(submission)
            .map_err(|e| SubmitError::Failed(e.to_string()))?;
        match post_json::<SubmissionReceipt>(url, body).await {
            Ok(receipt) => Ok(receipt),
            Err(RemoteError::Status { code }) => Err(SubmitError::Rejected { status: code }),
            // A 2xx with an unexpected body still counts as accepted.
            Err(RemoteError::Decode(_)) => Ok(SubmissionReceipt::default()),
            Err(other) => Err(SubmitError::Failed(other.to_string())),
        }
    }
}

#[async_trait]
impl PartialRemote for HttpRemoteClient {
    async fn push(&self, payload: &PartialPayload) -> Result<PartialReceipt, RemoteError> {
        let url = self.endpoint("partials");
        let body =
            serde_json::to_value(payload).map_err(|e| RemoteError::Decode(e.to_string()))?;
        post_json(url, body).await
    }

    async fn fetch(&self, token: &str) -> Result<Option<PartialPayload>, RemoteError> {
        let url = self.endpoint(&format!("partials/{token}"));
        tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            match agent.get(&url).call() {
                Ok(response) => response
                    .into_body()
                    .read_json::<PartialPayload>()
                    .map(Some)
                    .map_err(|e| RemoteError::Decode(e.to_string())),
                Err(ureq::Error::StatusCode(404)) => Ok(None),
                Err(e) => Err(map_ureq_error(e)),
            }
        })
        .await
        .map_err(|e| RemoteError::Transport(format!("task join error: {}", e)))?
    }

    async fn delete(&self, token: &str) -> Result<(), RemoteError> {
        let url = self.endpoint(&format!("partials/{token}"));
        tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            match agent.delete(&url).call() {
                Ok(_) => Ok(()),
                Err(ureq::Error::StatusCode(404)) => Ok(()),
                Err(e) => Err(map_ureq_error(e)),
            }
        })
        .await
        .map_err(|e| RemoteError::Transport(format!("task join error: {}", e)))?
    }
}

#[async_trait]
impl RemoteSave for HttpRemoteClient {
    async fn save(&self, record: &SnapshotRecord) -> Result<(), RemoteError> {
        let payload = PartialPayload {
            form_id: record.form_id.clone(),
            respondent_key: record.respondent_key.clone(),
            values: record.values.clone(),
            current_step: record.current_step,
            progress: record.progress,
            started_at: record.started_at.clone(),
            resume_token: record.resume_token.clone(),
            metadata: record.metadata.clone(),
        };
        self.push(&payload).await.map(|_| ())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = HttpRemoteClient::new("https://api.example.com/v1/");
        assert_eq!(
            client.endpoint("submissions"),
            "https://api.example.com/v1/submissions"
        );
    }

    #[test]
    fn partial_receipt_parses_expected_response() {
        let receipt: PartialReceipt = serde_json::from_value(serde_json::json!({
            "id": "p_1",
            "resume_token": "tok_abc",
            "expires_at": "2025-09-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(receipt.resume_token, "tok_abc");
    }

    #[test]
    fn status_errors_map_to_status_variant() {
        let err = map_ureq_error(ureq::Error::StatusCode(429));
        assert!(matches!(err, RemoteError::Status { code: 429 }));
    }
}
