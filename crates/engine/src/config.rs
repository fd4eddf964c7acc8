//! Runtime configuration surface.

use serde::{Deserialize, Serialize};

/// Recognized options on the runtime config object. Everything except
/// `form_id` has a default, so a caller can start from
/// [`RuntimeConfig::new`] and override selectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub form_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Overrides the auto-generated respondent key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respondent_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default = "default_true")]
    pub enable_offline: bool,
    /// Local-save debounce window.
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval_ms: u64,
    /// Remote-sync throttle window, independent of the save window.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_ms: u64,
    /// Connectivity polling fallback interval.
    #[serde(default = "default_connectivity_poll")]
    pub connectivity_poll_ms: u64,
    #[serde(default = "default_true")]
    pub enable_anti_spam: bool,
    #[serde(default = "default_min_completion_time")]
    pub min_completion_time_ms: u64,
    #[serde(default)]
    pub enable_analytics: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_api_url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_auto_save_interval() -> u64 {
    3_000
}

fn default_sync_interval() -> u64 {
    10_000
}

fn default_connectivity_poll() -> u64 {
    30_000
}

fn default_min_completion_time() -> u64 {
    3_000
}

impl RuntimeConfig {
    pub fn new(form_id: &str) -> Self {
        RuntimeConfig {
            form_id: form_id.to_string(),
            api_url: None,
            respondent_key: None,
            locale: None,
            enable_offline: true,
            auto_save_interval_ms: default_auto_save_interval(),
            sync_interval_ms: default_sync_interval(),
            connectivity_poll_ms: default_connectivity_poll(),
            enable_anti_spam: true,
            min_completion_time_ms: default_min_completion_time(),
            enable_analytics: false,
            analytics_api_url: None,
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_gets_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"form_id": "f1"}"#).unwrap();
        assert_eq!(config, RuntimeConfig::new("f1"));
        assert!(config.enable_anti_spam);
        assert_eq!(config.min_completion_time_ms, 3_000);
    }

    #[test]
    fn save_and_sync_windows_are_independent() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{"form_id": "f1", "auto_save_interval_ms": 1000, "sync_interval_ms": 30000}"#,
        )
        .unwrap();
        assert_eq!(config.auto_save_interval_ms, 1_000);
        assert_eq!(config.sync_interval_ms, 30_000);
        assert_ne!(config.auto_save_interval_ms, config.sync_interval_ms);
    }
}
