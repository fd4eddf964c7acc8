//! Headless session runner.
//!
//! Feeds an answers file through a real `FormSession` with the full
//! persistence stack, printing each step transition. Anti-spam is
//! disabled: this is a simulation tool, not a browser.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use formrun_engine::{
    FormSession, FormSubmission, RuntimeConfig, SubmissionReceipt, SubmitError, SubmitHandler,
    SystemClock,
};
use formrun_schema::{FieldValue, FormSchema};
use formrun_store::{JsonFileStore, MemoryStore, SnapshotStore};
use formrun_sync::{OfflineSyncService, PartialSaveService, PersistenceStack, SyncConfig};

/// Prints the submission instead of POSTing it.
struct EchoSubmit {
    quiet: bool,
}

#[async_trait]
impl SubmitHandler for EchoSubmit {
    async fn submit(&self, submission: &FormSubmission) -> Result<SubmissionReceipt, SubmitError> {
        if !self.quiet {
            let body = serde_json::to_string_pretty(&serde_json::json!({
                "form_id": submission.form_id,
                "values": submission.values,
                "started_at": submission.started_at,
                "completed_at": submission.completed_at,
            }))
            .map_err(|e| SubmitError::Failed(e.to_string()))?;
            println!("submission:\n{body}");
        }
        Ok(SubmissionReceipt {
            id: Some("headless".to_string()),
        })
    }
}

pub async fn run_session(
    schema_path: &Path,
    answers_path: &Path,
    store_dir: Option<&Path>,
    quiet: bool,
) -> i32 {
    let schema = match load_schema(schema_path) {
        Ok(schema) => schema,
        Err(message) => {
            eprintln!("error: {message}");
            return 2;
        }
    };
    let answers = match load_answers(answers_path) {
        Ok(answers) => answers,
        Err(message) => {
            eprintln!("error: {message}");
            return 2;
        }
    };

    let store: Arc<dyn SnapshotStore> = match store_dir {
        Some(dir) => match JsonFileStore::new(dir) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                eprintln!("error: cannot open store: {e}");
                return 2;
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let mut config = RuntimeConfig::new(&schema.id);
    config.enable_anti_spam = false;

    let clock = Arc::new(SystemClock);
    let sync = Arc::new(OfflineSyncService::new(
        SyncConfig::from_runtime(&config),
        store,
        clock.clone(),
    ));
    let partial = Arc::new(PartialSaveService::new(&config.form_id, clock.clone()));
    let stack = Arc::new(PersistenceStack::new(sync.clone(), partial));

    let mut session = FormSession::new(schema, config, clock)
        .with_persistence(stack)
        .with_submit_handler(Arc::new(EchoSubmit { quiet }));
    session.restore_from_saved().await;

    for (field, value) in &answers {
        session.set_value(field, value.clone());
    }

    let max_steps = session.schema().effective_blocks().len() + 1;
    for _ in 0..max_steps {
        if session.state().is_complete {
            break;
        }
        let before = session.state().current_step;
        if let Some(block) = session.current_block() {
            if !quiet {
                println!("step {}: {} ({})", before, block.id, block.question);
            }
        }
        session.go_next().await;
        if !session.state().is_complete && session.state().current_step == before {
            // Stuck: the current block failed validation.
            break;
        }
    }

    sync.shutdown().await;

    if session.state().is_complete {
        if !quiet {
            println!("session complete");
        }
        0
    } else {
        for (field, message) in &session.state().errors {
            eprintln!("unanswered: {field}: {message}");
        }
        1
    }
}

fn load_schema(path: &Path) -> Result<FormSchema, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    FormSchema::from_json(&raw).map_err(|e| format!("invalid schema JSON: {}", e))
}

fn load_answers(path: &Path) -> Result<Vec<(String, FieldValue)>, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let json: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| format!("invalid answers JSON: {}", e))?;
    match json {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from_json(&v)))
            .collect()),
        _ => Err("answers file must be a JSON object of block id -> value".to_string()),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixtures(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let schema_path = dir.join("schema.json");
        let answers_path = dir.join("answers.json");
        std::fs::write(
            &schema_path,
            serde_json::to_string_pretty(&serde_json::json!({
                "id": "demo",
                "blocks": [
                    {"id": "name", "type": "text", "question": "Name?", "required": true},
                    {"id": "email", "type": "email", "question": "Email?", "required": true}
                ]
            }))
            .unwrap(),
        )
        .unwrap();
        std::fs::write(
            &answers_path,
            r#"{"name": "Ada", "email": "ada@example.com"}"#,
        )
        .unwrap();
        (schema_path, answers_path)
    }

    #[tokio::test]
    async fn headless_run_completes_with_full_answers() {
        let dir = tempfile::tempdir().unwrap();
        let (schema_path, answers_path) = write_fixtures(dir.path());
        let code = run_session(&schema_path, &answers_path, None, true).await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn headless_run_fails_on_missing_required_answer() {
        let dir = tempfile::tempdir().unwrap();
        let (schema_path, _) = write_fixtures(dir.path());
        let answers_path = dir.path().join("partial.json");
        std::fs::write(&answers_path, r#"{"name": "Ada"}"#).unwrap();
        let code = run_session(&schema_path, &answers_path, None, true).await;
        assert_eq!(code, 1);
    }
}
