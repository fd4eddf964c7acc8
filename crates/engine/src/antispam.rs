//! Anti-automation gate: honeypot, time trap, and sliding-window rate
//! limiting, checked in that fixed priority order so the most certain
//! signal short-circuits first.
//!
//! The service is owned by the session that constructs it; there is no
//! process-global instance. Counters are in-memory and reset with the
//! process: this layer is a client-side deterrent, not a substitute for
//! server-side rate limiting.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::Clock;

/// One sliding-window limit: at most `max_requests` in any `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AntiSpamConfig {
    pub enabled: bool,
    /// Submissions faster than this after mount are rejected.
    pub min_completion_time_ms: u64,
    pub ip_limit: RateLimit,
    pub form_limit: RateLimit,
}

impl Default for AntiSpamConfig {
    fn default() -> Self {
        AntiSpamConfig {
            enabled: true,
            min_completion_time_ms: 3_000,
            ip_limit: RateLimit {
                max_requests: 10,
                window_ms: 60_000,
            },
            form_limit: RateLimit {
                max_requests: 50,
                window_ms: 60_000,
            },
        }
    }
}

/// Machine-readable rejection reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamReason {
    HoneypotFilled,
    TooFast,
    RateLimitIp,
    RateLimitForm,
}

impl SpamReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpamReason::HoneypotFilled => "honeypot_filled",
            SpamReason::TooFast => "too_fast",
            SpamReason::RateLimitIp => "rate_limit_ip",
            SpamReason::RateLimitForm => "rate_limit_form",
        }
    }
}

impl fmt::Display for SpamReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a gate check. A rejection is an expected outcome, not an
/// error; the caller decides what the end user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamVerdict {
    pub is_valid: bool,
    pub reason: Option<SpamReason>,
}

impl SpamVerdict {
    fn pass() -> Self {
        SpamVerdict {
            is_valid: true,
            reason: None,
        }
    }

    fn reject(reason: SpamReason) -> Self {
        SpamVerdict {
            is_valid: false,
            reason: Some(reason),
        }
    }
}

/// Caller-supplied context for one gate check.
#[derive(Debug, Clone, Default)]
pub struct SpamContext {
    pub ip: Option<String>,
    pub form_id: Option<String>,
    /// Bypass only the rate-limit check (e.g. a retry of a failed
    /// submission); honeypot and time trap still apply.
    pub skip_rate_limit: bool,
}

#[derive(Debug, Clone)]
struct TrapSession {
    started_at_ms: u64,
    honeypot: String,
}

/// The gate. One instance per form session.
pub struct AntiSpamService {
    config: AntiSpamConfig,
    clock: Arc<dyn Clock>,
    sessions: Mutex<BTreeMap<String, TrapSession>>,
    windows: Mutex<BTreeMap<String, Vec<u64>>>,
}

impl AntiSpamService {
    pub fn new(config: AntiSpamConfig, clock: Arc<dyn Clock>) -> Self {
        AntiSpamService {
            config,
            clock,
            sessions: Mutex::new(BTreeMap::new()),
            windows: Mutex::new(BTreeMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, BTreeMap<String, TrapSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn windows(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u64>>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record form mount: starts the time-trap clock for this session.
    pub fn begin_session(&self, session_id: &str) {
        let now = self.clock.now_ms();
        self.sessions().insert(
            session_id.to_string(),
            TrapSession {
                started_at_ms: now,
                honeypot: String::new(),
            },
        );
    }

    /// Mirror the live value of the hidden trap field.
    pub fn set_honeypot(&self, session_id: &str, value: &str) {
        if let Some(session) = self.sessions().get_mut(session_id) {
            session.honeypot = value.to_string();
        }
    }

    /// Run the gate. On success the attempt is recorded against both
    /// rate-limit counters (where ip / form id were supplied).
    pub fn validate(&self, session_id: &str, ctx: &SpamContext) -> SpamVerdict {
        if !self.config.enabled {
            return SpamVerdict::pass();
        }
        let now = self.clock.now_ms();

        let started_at = {
            let sessions = self.sessions();
            match sessions.get(session_id) {
                Some(session) => {
                    if !session.honeypot.is_empty() {
                        return SpamVerdict::reject(SpamReason::HoneypotFilled);
                    }
                    session.started_at_ms
                }
                // Unknown session: treat as just mounted.
                None => now,
            }
        };

        if now.saturating_sub(started_at) < self.config.min_completion_time_ms {
            return SpamVerdict::reject(SpamReason::TooFast);
        }

        if !ctx.skip_rate_limit {
            if let Some(ip) = &ctx.ip {
                let key = format!("ip:{ip}");
                if self.window_exceeded(&key, self.config.ip_limit, now) {
                    return SpamVerdict::reject(SpamReason::RateLimitIp);
                }
            }
            if let Some(form_id) = &ctx.form_id {
                let key = format!("form:{form_id}");
                if self.window_exceeded(&key, self.config.form_limit, now) {
                    return SpamVerdict::reject(SpamReason::RateLimitForm);
                }
            }
        }

        if let Some(ip) = &ctx.ip {
            self.record_attempt(&format!("ip:{ip}"), now);
        }
        if let Some(form_id) = &ctx.form_id {
            self.record_attempt(&format!("form:{form_id}"), now);
        }
        SpamVerdict::pass()
    }

    /// Clear per-session trap data (component unmount).
    pub fn end_session(&self, session_id: &str) {
        self.sessions().remove(session_id);
    }

    /// Prune rate-limit entries older than twice the largest configured
    /// window. Run periodically by the owner.
    pub fn sweep(&self) {
        let now = self.clock.now_ms();
        let horizon = 2 * self.config.ip_limit.window_ms.max(self.config.form_limit.window_ms);
        let cutoff = now.saturating_sub(horizon);
        let mut windows = self.windows();
        for attempts in windows.values_mut() {
            attempts.retain(|&ts| ts > cutoff);
        }
        windows.retain(|_, attempts| !attempts.is_empty());
    }

    fn window_exceeded(&self, key: &str, limit: RateLimit, now: u64) -> bool {
        let cutoff = now.saturating_sub(limit.window_ms);
        let mut windows = self.windows();
        let attempts = windows.entry(key.to_string()).or_default();
        attempts.retain(|&ts| ts > cutoff);
        attempts.len() >= limit.max_requests as usize
    }

    fn record_attempt(&self, key: &str, now: u64) {
        self.windows().entry(key.to_string()).or_default().push(now);
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn service(clock: Arc<ManualClock>) -> AntiSpamService {
        AntiSpamService::new(AntiSpamConfig::default(), clock)
    }

    fn ctx_for(form: &str) -> SpamContext {
        SpamContext {
            ip: Some("203.0.113.7".into()),
            form_id: Some(form.into()),
            skip_rate_limit: false,
        }
    }

    #[test]
    fn too_fast_then_passes_after_min_time() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(clock.clone());
        svc.begin_session("s1");

        let verdict = svc.validate("s1", &SpamContext::default());
        assert!(!verdict.is_valid);
        assert_eq!(verdict.reason, Some(SpamReason::TooFast));

        clock.advance(3_000);
        let verdict = svc.validate("s1", &SpamContext::default());
        assert!(verdict.is_valid);
        assert_eq!(verdict.reason, None);
    }

    #[test]
    fn honeypot_beats_every_other_check() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(clock.clone());
        svc.begin_session("s1");
        svc.set_honeypot("s1", "I am a bot");
        // Time trap would also reject here; honeypot must win.
        let verdict = svc.validate("s1", &SpamContext::default());
        assert_eq!(verdict.reason, Some(SpamReason::HoneypotFilled));

        clock.advance(10_000);
        let verdict = svc.validate("s1", &ctx_for("f1"));
        assert_eq!(verdict.reason, Some(SpamReason::HoneypotFilled));
    }

    #[test]
    fn ip_rate_limit_allows_exactly_max_requests() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(clock.clone());
        svc.begin_session("s1");
        clock.advance(5_000);

        let ctx = SpamContext {
            ip: Some("198.51.100.1".into()),
            form_id: None,
            skip_rate_limit: false,
        };
        for _ in 0..10 {
            assert!(svc.validate("s1", &ctx).is_valid);
        }
        let verdict = svc.validate("s1", &ctx);
        assert_eq!(verdict.reason, Some(SpamReason::RateLimitIp));

        // After the window elapses the same ip passes again.
        clock.advance(61_000);
        assert!(svc.validate("s1", &ctx).is_valid);
    }

    #[test]
    fn form_rate_limit_is_independent_of_ip() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = AntiSpamService::new(
            AntiSpamConfig {
                form_limit: RateLimit {
                    max_requests: 2,
                    window_ms: 60_000,
                },
                ..AntiSpamConfig::default()
            },
            clock.clone(),
        );
        svc.begin_session("s1");
        clock.advance(5_000);

        // Distinct ips, same form: the form counter still fills up.
        for i in 0..2 {
            let ctx = SpamContext {
                ip: Some(format!("198.51.100.{i}")),
                form_id: Some("f1".into()),
                skip_rate_limit: false,
            };
            assert!(svc.validate("s1", &ctx).is_valid);
        }
        let ctx = SpamContext {
            ip: Some("198.51.100.99".into()),
            form_id: Some("f1".into()),
            skip_rate_limit: false,
        };
        assert_eq!(svc.validate("s1", &ctx).reason, Some(SpamReason::RateLimitForm));
    }

    #[test]
    fn skip_rate_limit_bypasses_only_rate_limiting() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = AntiSpamService::new(
            AntiSpamConfig {
                ip_limit: RateLimit {
                    max_requests: 1,
                    window_ms: 60_000,
                },
                ..AntiSpamConfig::default()
            },
            clock.clone(),
        );
        svc.begin_session("s1");
        clock.advance(5_000);

        let mut ctx = ctx_for("f1");
        assert!(svc.validate("s1", &ctx).is_valid);
        assert_eq!(svc.validate("s1", &ctx).reason, Some(SpamReason::RateLimitIp));

        ctx.skip_rate_limit = true;
        assert!(svc.validate("s1", &ctx).is_valid);

        // The other two gates still apply under the bypass.
        svc.set_honeypot("s1", "x");
        assert_eq!(
            svc.validate("s1", &ctx).reason,
            Some(SpamReason::HoneypotFilled)
        );
    }

    #[test]
    fn unknown_session_counts_as_just_mounted() {
        let clock = Arc::new(ManualClock::new(50_000));
        let svc = service(clock);
        let verdict = svc.validate("never-begun", &SpamContext::default());
        assert_eq!(verdict.reason, Some(SpamReason::TooFast));
    }

    #[test]
    fn end_session_clears_trap_state() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(clock.clone());
        svc.begin_session("s1");
        svc.set_honeypot("s1", "bot");
        svc.end_session("s1");
        clock.advance(5_000);
        // A fresh begin_session starts clean.
        svc.begin_session("s1");
        clock.advance(5_000);
        assert!(svc.validate("s1", &SpamContext::default()).is_valid);
    }

    #[test]
    fn sweep_prunes_stale_windows() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(clock.clone());
        svc.begin_session("s1");
        clock.advance(5_000);
        assert!(svc.validate("s1", &ctx_for("f1")).is_valid);

        clock.advance(300_000);
        svc.sweep();
        assert!(svc.windows().is_empty());
    }

    #[test]
    fn disabled_gate_passes_everything() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = AntiSpamService::new(
            AntiSpamConfig {
                enabled: false,
                ..AntiSpamConfig::default()
            },
            clock,
        );
        svc.begin_session("s1");
        svc.set_honeypot("s1", "bot");
        assert!(svc.validate("s1", &SpamContext::default()).is_valid);
    }
}
