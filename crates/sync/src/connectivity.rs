//! Online/offline detection.
//!
//! The platform's connectivity signal is modeled as a probe the sync
//! service polls on an interval. Any HTTP answer from the probe target,
//! including an error status, proves the network path works; only a
//! transport-level failure counts as offline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probes with an HTTP HEAD against a cheap endpoint (typically the API
/// base URL).
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
}

impl HttpProbe {
    pub fn new(url: &str) -> Self {
        HttpProbe {
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        let url = self.url.clone();
        tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            match agent.head(&url).call() {
                Ok(_) => true,
                Err(ureq::Error::StatusCode(_)) => true,
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false)
    }
}

/// A probe with a hand-set answer, for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    online: Arc<AtomicBool>,
}

impl StaticProbe {
    pub fn new(online: bool) -> Self {
        StaticProbe {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
