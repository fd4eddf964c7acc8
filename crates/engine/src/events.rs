//! Per-session event channel.
//!
//! Each session owns its own bus; there is no process-global emitter.
//! Subscribers receive events over an unbounded channel and simply stop
//! receiving when the session is dropped. Dead receivers are pruned on
//! the next emit.

use std::sync::Mutex;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::antispam::SpamReason;

/// Observable session happenings, in the order they occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A persisted snapshot was loaded on mount.
    Restored { step: usize },
    ValueChanged { field: String },
    StepChanged { step: usize },
    /// The anti-automation gate rejected a submission attempt.
    SpamDetected { reason: SpamReason },
    Submitted,
    SubmitFailed { message: String },
}

/// Fan-out bus for [`SessionEvent`].
#[derive(Debug, Default)]
pub struct EventBus {
    senders: Mutex<Vec<UnboundedSender<SessionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    pub fn emit(&self, event: SessionEvent) {
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
