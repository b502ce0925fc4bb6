//! Best-effort multi-delete: N independent `remove` calls in flight at once,
//! one terminal report once the last of them resolves.

use futures::{stream::FuturesUnordered, StreamExt};
use shared::{domain::UserId, protocol::UserRecord};
use tracing::{info, warn};

use crate::{
    directory::UserDirectory,
    error::{OperationFailure, OperationOutcome},
};

/// Counters for one batch. Owned by the running batch and threaded through
/// each resolution by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    total: usize,
    outstanding: usize,
    failed: usize,
}

impl BatchProgress {
    pub fn start(total: usize) -> Self {
        Self {
            total,
            outstanding: total,
            failed: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn succeeded(&self) -> usize {
        self.total - self.outstanding - self.failed
    }

    pub fn any_failure(&self) -> bool {
        self.failed > 0
    }

    pub fn is_settled(&self) -> bool {
        self.outstanding == 0
    }

    /// Accounts for one resolved call. Resolutions past the last outstanding
    /// one are ignored.
    #[must_use]
    pub fn record(self, succeeded: bool) -> Self {
        if self.outstanding == 0 {
            return self;
        }
        Self {
            total: self.total,
            outstanding: self.outstanding - 1,
            failed: self.failed + usize::from(!succeeded),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTerminal {
    /// Every delete succeeded (including the empty batch).
    Succeeded { deleted: usize },
    /// Some, but not all, deletes failed.
    PartialFailure { deleted: usize, failed: usize },
    /// Every delete failed.
    Failed { failed: usize },
}

impl BatchTerminal {
    fn from_settled(progress: BatchProgress) -> Self {
        let deleted = progress.succeeded();
        match (deleted, progress.failed()) {
            (deleted, 0) => Self::Succeeded { deleted },
            (0, failed) => Self::Failed { failed },
            (deleted, failed) => Self::PartialFailure { deleted, failed },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub id: UserId,
    pub failure: OperationFailure,
}

/// The terminal signal of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub terminal: BatchTerminal,
    pub progress: BatchProgress,
    pub deleted: Vec<UserId>,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn empty() -> Self {
        Self {
            terminal: BatchTerminal::Succeeded { deleted: 0 },
            progress: BatchProgress::start(0),
            deleted: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Issues `remove` for every id concurrently and waits for all of them.
///
/// `on_resolved` runs once per id, in completion order, with the progress
/// after that resolution; a failure is visible there before the batch ends
/// and never stops the other calls. The returned report is produced exactly
/// once, after the outstanding count reaches zero.
pub async fn delete_batch<D, F>(directory: &D, ids: &[UserId], mut on_resolved: F) -> BatchReport
where
    D: UserDirectory + ?Sized,
    F: FnMut(&UserId, &OperationOutcome<UserRecord>, BatchProgress),
{
    if ids.is_empty() {
        return BatchReport::empty();
    }

    info!(total = ids.len(), "batch: deleting selected users");
    let mut progress = BatchProgress::start(ids.len());
    let mut deleted = Vec::new();
    let mut failures = Vec::new();

    let mut pending: FuturesUnordered<_> = ids
        .iter()
        .map(|id| async move { (id, directory.remove(id).await) })
        .collect();

    while let Some((id, outcome)) = pending.next().await {
        progress = progress.record(outcome.is_success());
        on_resolved(id, &outcome, progress);
        match outcome {
            OperationOutcome::Success(_) => deleted.push(id.clone()),
            OperationOutcome::Failure(failure) => {
                warn!(
                    user_id = %id,
                    outstanding = progress.outstanding(),
                    error = %failure,
                    "batch: delete failed"
                );
                failures.push(ItemFailure {
                    id: id.clone(),
                    failure,
                });
            }
        }
    }

    let terminal = BatchTerminal::from_settled(progress);
    info!(
        deleted = deleted.len(),
        failed = failures.len(),
        "batch: all deletes resolved"
    );
    BatchReport {
        terminal,
        progress,
        deleted,
        failures,
    }
}

#[cfg(test)]
#[path = "tests/batch_tests.rs"]
mod tests;
