//! Batched analytics shipping.
//!
//! Events queue in memory and flush as one `POST {analytics_api}/batch`
//! call, either when the batch size threshold is reached or on the
//! owner's timer. A failed flush logs and re-queues the batch for the
//! next attempt; analytics must never surface an error to the caller.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::remote::RemoteError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_type: String,
    pub form_id: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

/// Where batches go. The HTTP implementation posts to the analytics API;
/// tests swap in a recorder.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn post_batch(&self, events: &[AnalyticsEvent]) -> Result<(), RemoteError>;
}

/// Posts batches to `POST {analytics_api}/batch`.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    api_url: String,
}

impl HttpEventSink {
    pub fn new(api_url: &str) -> Self {
        HttpEventSink {
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn post_batch(&self, events: &[AnalyticsEvent]) -> Result<(), RemoteError> {
        let url = format!("{}/batch", self.api_url);
        let body = serde_json::json!({ "events": events });
        tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            match agent.post(&url).send_json(&body) {
                Ok(_) => Ok(()),
                Err(ureq::Error::StatusCode(code)) => Err(RemoteError::Status { code }),
                Err(e) => Err(RemoteError::Transport(e.to_string())),
            }
        })
        .await
        .map_err(|e| RemoteError::Transport(format!("task join error: {}", e)))?
    }
}

/// The queue in front of an [`EventSink`].
pub struct AnalyticsBatcher {
    sink: Arc<dyn EventSink>,
    queue: Mutex<Vec<AnalyticsEvent>>,
    batch_size: usize,
}

impl AnalyticsBatcher {
    pub fn new(sink: Arc<dyn EventSink>, batch_size: usize) -> Self {
        AnalyticsBatcher {
            sink,
            queue: Mutex::new(Vec::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Queue an event. Returns true when the queue has reached the batch
    /// threshold and the owner should flush.
    pub fn track(&self, event: AnalyticsEvent) -> bool {
        let mut queue = self.lock();
        queue.push(event);
        queue.len() >= self.batch_size
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Ship everything queued. On failure the batch is re-queued at the
    /// front so ordering survives for the next attempt.
    pub async fn flush(&self) {
        let batch: Vec<AnalyticsEvent> = self.lock().drain(..).collect();
        if batch.is_empty() {
            return;
        }
        match self.sink.post_batch(&batch).await {
            Ok(()) => debug!(count = batch.len(), "analytics batch shipped"),
            Err(e) => {
                warn!(error = %e, count = batch.len(), "analytics batch failed; re-queued");
                let mut queue = self.lock();
                let mut requeued = batch;
                requeued.extend(queue.drain(..));
                *queue = requeued;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AnalyticsEvent>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeSink {
        fail: AtomicBool,
        batches: Mutex<Vec<Vec<AnalyticsEvent>>>,
    }

    #[async_trait]
    impl EventSink for FakeSink {
        async fn post_batch(&self, events: &[AnalyticsEvent]) -> Result<(), RemoteError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RemoteError::Transport("down".into()));
            }
            self.batches.lock().unwrap().push(events.to_vec());
            Ok(())
        }
    }

    fn event(name: &str) -> AnalyticsEvent {
        AnalyticsEvent {
            event_type: name.to_string(),
            form_id: "f1".to_string(),
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn flush_ships_queued_events_once() {
        let sink = Arc::new(FakeSink::default());
        let batcher = AnalyticsBatcher::new(sink.clone(), 10);
        batcher.track(event("form_view"));
        batcher.track(event("step_complete"));
        batcher.flush().await;
        batcher.flush().await;

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batcher.pending(), 0);
    }

    #[tokio::test]
    async fn failed_flush_requeues_in_order() {
        let sink = Arc::new(FakeSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let batcher = AnalyticsBatcher::new(sink.clone(), 10);
        batcher.track(event("first"));
        batcher.flush().await;
        assert_eq!(batcher.pending(), 1);

        batcher.track(event("second"));
        sink.fail.store(false, Ordering::SeqCst);
        batcher.flush().await;

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let names: Vec<&str> = batches[0].iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[tokio::test]
    async fn track_signals_batch_threshold() {
        let batcher = AnalyticsBatcher::new(Arc::new(FakeSink::default()), 2);
        assert!(!batcher.track(event("a")));
        assert!(batcher.track(event("b")));
    }
}
