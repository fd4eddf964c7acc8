//! The runtime orchestrator: a step machine over the visible-block
//! sequence that wires value changes through the logic evaluator,
//! snapshots through the persistence seam, and final submission through
//! the anti-automation gate.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;

use formrun_schema::{Block, FieldValue, FormSchema};

use crate::antispam::{AntiSpamConfig, AntiSpamService, SpamContext};
use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::events::{EventBus, SessionEvent};
use crate::hooks::{
    rfc3339_from_ms, submission_metadata, FormSubmission, SessionPersistence, SubmitError,
    SubmitHandler,
};
use crate::logic::{LogicEvaluator, NavKind, Navigation};
use crate::state::{values_to_json, FormState, SessionSnapshot};
use crate::validate::{validate_all, validate_field};

/// One respondent's interactive session over one form.
pub struct FormSession {
    schema: FormSchema,
    config: RuntimeConfig,
    state: FormState,
    evaluator: LogicEvaluator,
    pending_nav: Option<Navigation>,
    antispam: AntiSpamService,
    spam_ctx: SpamContext,
    session_id: String,
    respondent_key: String,
    started_at_ms: u64,
    resume_token: Option<String>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    persistence: Option<Arc<dyn SessionPersistence>>,
    submit_handler: Option<Arc<dyn SubmitHandler>>,
}

impl FormSession {
    pub fn new(schema: FormSchema, config: RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        let antispam = AntiSpamService::new(
            AntiSpamConfig {
                enabled: config.enable_anti_spam,
                min_completion_time_ms: config.min_completion_time_ms,
                ..AntiSpamConfig::default()
            },
            clock.clone(),
        );
        let session_id = generate_key();
        antispam.begin_session(&session_id);
        let respondent_key = config
            .respondent_key
            .clone()
            .unwrap_or_else(generate_key);
        let spam_ctx = SpamContext {
            ip: None,
            form_id: Some(config.form_id.clone()),
            skip_rate_limit: false,
        };
        let started_at_ms = clock.now_ms();
        FormSession {
            schema,
            config,
            state: FormState::new(),
            evaluator: LogicEvaluator::new(),
            pending_nav: None,
            antispam,
            spam_ctx,
            session_id,
            respondent_key,
            started_at_ms,
            resume_token: None,
            clock,
            events: EventBus::new(),
            persistence: None,
            submit_handler: None,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn SessionPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Without a handler, submission reports `SubmitFailed`; the runtime
    /// builder installs the default HTTP handler when an `api_url` is
    /// configured.
    pub fn with_submit_handler(mut self, handler: Arc<dyn SubmitHandler>) -> Self {
        self.submit_handler = Some(handler);
        self
    }

    /// Attribute this session to a submitter ip for rate limiting.
    pub fn with_ip(mut self, ip: &str) -> Self {
        self.spam_ctx.ip = Some(ip.to_string());
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn respondent_key(&self) -> &str {
        &self.respondent_key
    }

    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The block list filtered by "not hidden by logic". Visibility has
    /// exactly one source: the evaluator's hidden-set.
    pub fn visible_blocks(&self) -> Vec<&Block> {
        self.schema
            .effective_blocks()
            .into_iter()
            .filter(|b| !self.evaluator.hidden().contains(&b.id))
            .collect()
    }

    pub fn current_block(&self) -> Option<&Block> {
        self.visible_blocks().into_iter().nth(self.state.current_step)
    }

    pub fn progress(&self) -> f32 {
        let visible = self.visible_blocks().len();
        if visible == 0 {
            return 0.0;
        }
        (self.state.current_step + 1) as f32 / visible as f32 * 100.0
    }

    /// Full-state snapshot for the persistence layer.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            respondent_key: self.respondent_key.clone(),
            values: self.state.values.clone(),
            current_step: self.state.current_step,
            progress: self.progress(),
            started_at_ms: self.started_at_ms,
            resume_token: self.resume_token.clone(),
            metadata: None,
        }
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Record an answer. A field currently hidden by logic cannot be
    /// mutated; the call is a no-op.
    pub fn set_value(&mut self, field: &str, value: FieldValue) {
        if self.evaluator.hidden().contains(field) {
            return;
        }
        self.state.values.insert(field.to_string(), value);
        self.state.touched.insert(field.to_string());
        self.state.errors.remove(field);
        self.run_logic();
        self.events.emit(SessionEvent::ValueChanged {
            field: field.to_string(),
        });
        self.persist();
    }

    /// Mark a field as visited without changing its value.
    pub fn touch(&mut self, field: &str) {
        self.state.touched.insert(field.to_string());
    }

    /// Mirror the hidden trap field's live value.
    pub fn set_honeypot(&self, value: &str) {
        self.antispam.set_honeypot(&self.session_id, value);
    }

    /// Whether the current block passes validation as answered.
    pub fn can_go_next(&self) -> bool {
        match self.current_block() {
            Some(block) => {
                let value = self
                    .state
                    .values
                    .get(&block.id)
                    .cloned()
                    .unwrap_or_default();
                validate_field(block, &value).is_none()
            }
            None => true,
        }
    }

    /// Advance. Pending `jump`/`skip` navigation staged by the last logic
    /// pass is consumed here; stepping past the last visible block
    /// triggers final submission instead.
    pub async fn go_next(&mut self) {
        if self.state.is_complete || self.state.is_submitting {
            return;
        }
        self.antispam.sweep();
        if !self.validate_current() {
            return;
        }
        let visible_ids: Vec<String> = self
            .visible_blocks()
            .iter()
            .map(|b| b.id.clone())
            .collect();
        let len = visible_ids.len();

        let target_index = match self.pending_nav.take() {
            Some(Navigation {
                kind: NavKind::Jump,
                target,
            }) => visible_ids.iter().position(|id| *id == target),
            Some(Navigation {
                kind: NavKind::Skip,
                target,
            }) => visible_ids
                .iter()
                .position(|id| *id == target)
                .map(|i| i + 1),
            None => None,
        };

        match target_index {
            Some(index) if index < len => {
                self.state.current_step = index;
                self.events.emit(SessionEvent::StepChanged { step: index });
                self.persist();
            }
            Some(_) => {
                // Navigation points past the end of the form.
                self.submit().await;
            }
            None => {
                if self.state.current_step + 1 >= len {
                    self.submit().await;
                } else {
                    self.state.current_step += 1;
                    self.events.emit(SessionEvent::StepChanged {
                        step: self.state.current_step,
                    });
                    self.persist();
                }
            }
        }
    }

    /// Step backward. No validation required to go back.
    pub fn go_prev(&mut self) {
        if self.state.current_step > 0 {
            self.state.current_step -= 1;
            self.events.emit(SessionEvent::StepChanged {
                step: self.state.current_step,
            });
            self.persist();
        }
    }

    /// Final submission: full-form validation, then the anti-automation
    /// gate, then the submit handler. A gate rejection is reported as a
    /// `SpamDetected` event and changes no state.
    pub async fn submit(&mut self) {
        if self.state.is_complete || self.state.is_submitting {
            return;
        }

        let errors = validate_all(&self.visible_blocks(), &self.state.values);
        if !errors.is_empty() {
            self.state.errors = errors;
            return;
        }

        let verdict = self.antispam.validate(&self.session_id, &self.spam_ctx);
        if !verdict.is_valid {
            if let Some(reason) = verdict.reason {
                self.events.emit(SessionEvent::SpamDetected { reason });
            }
            return;
        }

        self.state.is_submitting = true;
        let submission = FormSubmission {
            form_id: self.config.form_id.clone(),
            values: values_to_json(&self.state.values),
            started_at: rfc3339_from_ms(self.started_at_ms),
            completed_at: rfc3339_from_ms(self.clock.now_ms()),
            metadata: submission_metadata(
                self.config.locale.as_deref(),
                &self.respondent_key,
                None,
            ),
        };

        let result = match &self.submit_handler {
            Some(handler) => handler.submit(&submission).await,
            None => Err(SubmitError::Failed(
                "no submit handler configured".to_string(),
            )),
        };

        match result {
            Ok(_receipt) => {
                self.state.is_submitting = false;
                self.state.is_complete = true;
                if let Some(persistence) = &self.persistence {
                    persistence.clear(&self.respondent_key).await;
                }
                self.antispam.end_session(&self.session_id);
                self.events.emit(SessionEvent::Submitted);
            }
            Err(error) => {
                self.state.is_submitting = false;
                self.events.emit(SessionEvent::SubmitFailed {
                    message: error.to_string(),
                });
            }
        }
    }

    /// Resume from the freshest persisted snapshot, if one exists.
    /// Returns true when a snapshot was loaded.
    pub async fn restore_from_saved(&mut self) -> bool {
        let Some(persistence) = self.persistence.clone() else {
            return false;
        };
        let Some(snapshot) = persistence.restore().await else {
            return false;
        };
        self.respondent_key = snapshot.respondent_key;
        self.state.values = snapshot.values;
        self.started_at_ms = snapshot.started_at_ms;
        self.resume_token = snapshot.resume_token;
        self.run_logic();
        // Restoring is not a user change; staged navigation is dropped.
        self.pending_nav = None;
        let visible = self.visible_blocks().len();
        self.state.current_step = snapshot.current_step.min(visible.saturating_sub(1));
        self.events.emit(SessionEvent::Restored {
            step: self.state.current_step,
        });
        true
    }

    /// Tear down session-scoped anti-spam state. Safe to call more than
    /// once.
    pub fn destroy(&mut self) {
        self.antispam.end_session(&self.session_id);
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn run_logic(&mut self) {
        let effects = self.evaluator.run_pass(&self.schema.logic, &self.state.values);
        for (field, value) in effects.field_updates {
            self.state.values.insert(field, value);
        }
        self.pending_nav = effects.navigation;
        let visible = self.visible_blocks().len();
        if visible > 0 && self.state.current_step >= visible {
            self.state.current_step = visible - 1;
        }
    }

    fn validate_current(&mut self) -> bool {
        let Some(block) = self.current_block() else {
            return true;
        };
        let id = block.id.clone();
        let value = self.state.values.get(&id).cloned().unwrap_or_default();
        let block = self.schema.block(&id).cloned();
        match block.as_ref().and_then(|b| validate_field(b, &value)) {
            Some(message) => {
                self.state.errors.insert(id, message);
                false
            }
            None => true,
        }
    }

    fn persist(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.save(&self.snapshot());
        }
    }
}

fn generate_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
