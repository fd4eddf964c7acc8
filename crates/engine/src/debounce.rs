//! Trailing-edge debouncer shared by the local-save and remote-sync
//! throttles.
//!
//! The window opens at the first `offer` after an idle period; later
//! offers within the window replace the payload without extending the
//! deadline, so a continuous stream of edits still flushes once per
//! window with the latest state. Timing is poll-driven: the owner's tick
//! loop calls `poll` with the current clock reading.

/// A single-slot, latest-wins debouncer.
#[derive(Debug)]
pub struct Debouncer<T> {
    window_ms: u64,
    pending: Option<T>,
    deadline_ms: u64,
}

impl<T> Debouncer<T> {
    pub fn new(window_ms: u64) -> Self {
        Debouncer {
            window_ms,
            pending: None,
            deadline_ms: 0,
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Stage an item. The first offer after idle arms the deadline.
    pub fn offer(&mut self, item: T, now_ms: u64) {
        if self.pending.is_none() {
            self.deadline_ms = now_ms.saturating_add(self.window_ms);
        }
        self.pending = Some(item);
    }

    /// Yield the staged item once the window has elapsed.
    pub fn poll(&mut self, now_ms: u64) -> Option<T> {
        if self.pending.is_some() && now_ms >= self.deadline_ms {
            self.pending.take()
        } else {
            None
        }
    }

    /// Yield the staged item unconditionally (teardown path).
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
