//! Progress text, error text, and the busy indicator.
//!
//! The two text channels are independent; both may be non-empty at once.

use crate::error::OperationFailure;

/// Lifecycle of one user-facing action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub progress: String,
    pub error: String,
    pub busy: bool,
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    progress: String,
    error: String,
    in_flight: usize,
}

impl StatusBoard {
    /// Idle -> Pending. The old error is cleared before the new text lands.
    pub fn begin(&mut self, progress: impl Into<String>) -> ActionPhase {
        self.error.clear();
        self.progress = progress.into();
        self.in_flight += 1;
        ActionPhase::Pending
    }

    /// Pending -> Succeeded.
    pub fn succeed(&mut self, result: impl Into<String>) -> ActionPhase {
        self.error.clear();
        self.progress = result.into();
        self.settle_one();
        ActionPhase::Succeeded
    }

    /// Pending -> Failed.
    pub fn fail(&mut self, failure: &OperationFailure) -> ActionPhase {
        self.note_failure(failure);
        self.settle_one();
        ActionPhase::Failed
    }

    /// Pending -> Failed for an aggregate whose individual errors were
    /// already surfaced; the last error text stays visible.
    pub fn settle_with_errors(&mut self, summary: impl Into<String>) -> ActionPhase {
        self.progress = summary.into();
        self.settle_one();
        ActionPhase::Failed
    }

    /// Surfaces a failure without ending the action.
    pub fn note_failure(&mut self, failure: &OperationFailure) {
        self.progress.clear();
        self.error = failure.to_string();
    }

    pub fn note_progress(&mut self, progress: impl Into<String>) {
        self.progress = progress.into();
    }

    pub fn clear_error(&mut self) {
        self.error.clear();
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            progress: self.progress.clone(),
            error: self.error.clone(),
            busy: self.is_busy(),
        }
    }

    fn settle_one(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}
