//! Formrun runtime engine.
//!
//! The engine drives one respondent's session through a published form:
//! it re-evaluates conditional logic on every input change, validates
//! answers, gates final submission behind anti-automation checks, and
//! hands full-state snapshots to a pluggable persistence layer.
//!
//! The engine performs no I/O of its own. Time comes from an injected
//! [`Clock`], persistence goes through the [`SessionPersistence`] trait,
//! and submission goes through the [`SubmitHandler`] trait, so the whole
//! state machine is deterministic under test.

pub mod antispam;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod events;
pub mod hooks;
pub mod logic;
pub mod session;
pub mod state;
pub mod validate;

pub use antispam::{
    AntiSpamConfig, AntiSpamService, RateLimit, SpamContext, SpamReason, SpamVerdict,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RuntimeConfig;
pub use debounce::Debouncer;
pub use events::{EventBus, SessionEvent};
pub use hooks::{
    FormSubmission, SessionPersistence, StaticSubmitHandler, SubmissionReceipt, SubmitError,
    SubmitHandler,
};
pub use logic::{LogicEffects, LogicEvaluator, NavKind, Navigation};
pub use session::FormSession;
pub use state::{values_from_json, values_to_json, FormState, SessionSnapshot};
pub use validate::{validate_all, validate_field};
