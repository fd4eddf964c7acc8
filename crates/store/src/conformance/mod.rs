//! Conformance test suite for `SnapshotStore` implementations.
//!
//! A backend-agnostic suite that any `SnapshotStore` implementation can
//! run to verify correctness. The suite covers:
//!
//! - **Round-trip**: put/get equality, overwrite-by-key semantics
//! - **Sync stamps**: `synced_at` preservation on local writes,
//!   `mark_synced` stamping and retry reset
//! - **Latest**: most-recently-updated selection across respondent keys
//! - **Cleanup**: completed-only retention policy
//! - **Delete**: whole-form removal
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function
//! that creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use formrun_store::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn my_backend_conformance() {
//!     let report = run_conformance_suite(|| async { MyStore::new() }).await;
//!     assert_eq!(report.failed, 0, "{report}");
//! }
//! ```

mod cleanup;
mod delete;
mod latest;
mod roundtrip;
mod synced;

use std::fmt;
use std::future::Future;

use crate::record::{rfc3339_from_ms, SnapshotRecord};
use crate::SnapshotStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "roundtrip", "cleanup").
    pub category: String,
    /// Test name.
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: true,
                message: None,
            },
            Err(msg) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: false,
                message: Some(msg),
            },
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh,
/// empty storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(roundtrip::run_roundtrip_tests(&factory).await);
    results.extend(synced::run_synced_tests(&factory).await);
    results.extend(latest::run_latest_tests(&factory).await);
    results.extend(cleanup::run_cleanup_tests(&factory).await);
    results.extend(delete::run_delete_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_record(form_id: &str, respondent_key: &str, updated_ms: u64) -> SnapshotRecord {
    SnapshotRecord {
        form_id: form_id.to_string(),
        respondent_key: respondent_key.to_string(),
        values: serde_json::json!({"name": "Ada", "email": "ada@example.com"}),
        current_step: 1,
        progress: 50.0,
        started_at: rfc3339_from_ms(updated_ms.saturating_sub(60_000)),
        updated_at: rfc3339_from_ms(updated_ms),
        synced_at: None,
        completed_at: None,
        resume_token: None,
        retry_count: 0,
        metadata: None,
    }
}
