use std::sync::Arc;

use shared::{
    domain::UserId,
    protocol::{UserPage, UserRecord},
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    batch::{delete_batch, BatchReport, BatchTerminal},
    directory::UserDirectory,
    error::{Operation, OperationFailure, OperationOutcome},
    reconciler::{SelectionSet, UserCollection, UserStore},
    status::{ActionPhase, StatusBoard, StatusSnapshot},
};

const FETCHING_ALL: &str = "Fetching all users ...";
const NO_USERS: &str = "No users provisioned";
const CREATING: &str = "Creating a new user ...";
const UPDATING: &str = "Updating existing user ...";
const MODIFIED: &str = "User has been modified";
const DELETE_PENDING: &str = "Users pending for deletion ...";
const ALL_DELETED: &str = "All selected users have been deleted from backend";
const SOME_DELETES_FAILED: &str = "Some delete operation(s) failed.";
const ALL_DELETES_FAILED: &str = "None of the selected users could be deleted.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftKind {
    New,
    Existing(UserId),
}

/// The record currently open for editing.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub kind: DraftKind,
    pub record: UserRecord,
}

#[derive(Debug, Clone)]
pub enum ManagerEvent {
    Status(StatusSnapshot),
    UsersReplaced(UserCollection),
    SelectionReplaced(SelectionSet),
    DraftChanged(Option<Draft>),
    DeleteFailed {
        id: UserId,
        failure: OperationFailure,
    },
    BatchFinished(BatchReport),
}

/// Drives user intents against the directory and reconciles local state
/// from what the server reports back. Never mutates the collection on a
/// guess: every change is either a server listing or a server record.
pub struct UserManager {
    directory: Arc<dyn UserDirectory>,
    store: UserStore,
    status: StatusBoard,
    draft: Option<Draft>,
    events: broadcast::Sender<ManagerEvent>,
}

impl UserManager {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            directory,
            store: UserStore::default(),
            status: StatusBoard::default(),
            draft: None,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    pub fn users(&self) -> UserCollection {
        self.store.users()
    }

    pub fn selection(&self) -> SelectionSet {
        self.store.selection()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub async fn fetch_all(&mut self) -> ActionPhase {
        self.close_draft();
        self.status.begin(FETCHING_ALL);
        self.publish_status();

        let outcome = self.directory.list_all().await;
        let phase = match outcome {
            OperationOutcome::Success(page) => self.apply_page(page),
            OperationOutcome::Failure(failure) => self.status.fail(&failure),
        };
        self.publish_status();
        phase
    }

    fn apply_page(&mut self, page: UserPage) -> ActionPhase {
        let records = if page.total_count > 0 {
            page.results
        } else {
            Vec::new()
        };
        match self.store.replace_all(records) {
            Ok(users) => {
                info!(count = users.len(), "users: collection replaced");
                let summary = if users.is_empty() {
                    NO_USERS.to_string()
                } else {
                    format!("Retrieved {} users", users.len())
                };
                self.publish(ManagerEvent::UsersReplaced(users));
                self.status.succeed(summary)
            }
            Err(err) => {
                warn!(error = %err, "users: listing rejected");
                self.status
                    .fail(&OperationFailure::local(Operation::ListAll, err.to_string()))
            }
        }
    }

    pub async fn fetch_one(&mut self, id: &UserId) -> ActionPhase {
        self.refresh_one(
            id,
            format!("Fetching user {id} ..."),
            format!("User {id} is up to date"),
        )
        .await
    }

    async fn refresh_one(&mut self, id: &UserId, pending: String, done: String) -> ActionPhase {
        self.status.begin(pending);
        self.publish_status();

        let phase = match self.directory.get_one(id).await {
            OperationOutcome::Success(record) => {
                if self.store.replace_one(record) {
                    self.publish(ManagerEvent::UsersReplaced(self.store.users()));
                } else {
                    debug!(user_id = %id, "users: fetched record is not in the collection");
                }
                self.status.succeed(done)
            }
            OperationOutcome::Failure(failure) => self.status.fail(&failure),
        };
        self.publish_status();
        phase
    }

    /// Creates the record and, on success, refreshes the whole collection.
    /// The returned phase is that of the refresh once the create succeeded.
    pub async fn create_user(&mut self, record: UserRecord) -> ActionPhase {
        self.status.begin(CREATING);
        self.publish_status();

        match self.directory.create(&record).await {
            OperationOutcome::Success(created) => {
                info!(
                    user_id = created.id.as_ref().map(UserId::as_str).unwrap_or_default(),
                    "users: created"
                );
                self.status.succeed("User has been created");
                self.publish_status();
                self.fetch_all().await
            }
            OperationOutcome::Failure(failure) => {
                let phase = self.status.fail(&failure);
                self.publish_status();
                phase
            }
        }
    }

    /// Updates the record and, on success, re-fetches just that record. A
    /// failed re-fetch makes the whole action fail.
    pub async fn update_user(&mut self, record: UserRecord) -> ActionPhase {
        self.status.begin(UPDATING);
        self.publish_status();

        match self.directory.update(&record).await {
            OperationOutcome::Success(updated) => {
                self.status.succeed(MODIFIED);
                self.publish_status();
                match updated.id.or(record.id) {
                    Some(id) => {
                        let pending = format!("{MODIFIED}, refreshing ...");
                        self.refresh_one(&id, pending, MODIFIED.into()).await
                    }
                    None => {
                        warn!("users: update response carried no identifier");
                        ActionPhase::Succeeded
                    }
                }
            }
            OperationOutcome::Failure(failure) => {
                let phase = self.status.fail(&failure);
                self.publish_status();
                phase
            }
        }
    }

    pub fn toggle_selection(&mut self, id: UserId, selected: bool) {
        if self.store.toggle_selection(id, selected) {
            self.publish(ManagerEvent::SelectionReplaced(self.store.selection()));
        }
    }

    /// Deletes every selected user. The selection is cleared once the batch
    /// settles, whatever the outcome; only a fully successful batch
    /// triggers a refresh.
    pub async fn delete_selected(&mut self) -> BatchReport {
        let ids: Vec<UserId> = self.store.selection().iter().cloned().collect();
        if ids.is_empty() {
            let report = BatchReport::empty();
            self.publish(ManagerEvent::BatchFinished(report.clone()));
            return report;
        }

        self.status.begin(DELETE_PENDING);
        self.publish_status();

        let directory = Arc::clone(&self.directory);
        let status = &mut self.status;
        let events = &self.events;
        let report = delete_batch(directory.as_ref(), &ids, |id, outcome, progress| {
            match outcome.failure() {
                Some(failure) => {
                    status.note_failure(failure);
                    let _ = events.send(ManagerEvent::DeleteFailed {
                        id: id.clone(),
                        failure: failure.clone(),
                    });
                }
                None if !progress.is_settled() => status.note_progress(format!(
                    "Users pending for deletion: {}",
                    progress.outstanding()
                )),
                None => {}
            }
            let _ = events.send(ManagerEvent::Status(status.snapshot()));
        })
        .await;

        if self.store.clear_selection() {
            self.publish(ManagerEvent::SelectionReplaced(self.store.selection()));
        }
        match report.terminal {
            BatchTerminal::Succeeded { .. } => self.status.succeed(ALL_DELETED),
            BatchTerminal::PartialFailure { .. } => {
                self.status.settle_with_errors(SOME_DELETES_FAILED)
            }
            BatchTerminal::Failed { .. } => self.status.settle_with_errors(ALL_DELETES_FAILED),
        };
        self.publish_status();
        self.publish(ManagerEvent::BatchFinished(report.clone()));

        if report.terminal.is_success() {
            self.fetch_all().await;
        }
        report
    }

    /// Opens an empty create form. Rejected while one is already open.
    pub fn open_new_draft(&mut self) -> bool {
        if matches!(
            self.draft,
            Some(Draft {
                kind: DraftKind::New,
                ..
            })
        ) {
            debug!("users: create form already open, ignoring");
            return false;
        }
        self.status.clear_error();
        self.publish_status();
        self.set_draft(Some(Draft {
            kind: DraftKind::New,
            record: UserRecord::default(),
        }));
        true
    }

    /// Shows the details of a known user; asking again for the same user
    /// hides them. Returns whether a details draft is open afterwards.
    pub fn open_details(&mut self, id: &UserId) -> bool {
        let already_open = matches!(
            &self.draft,
            Some(Draft { kind: DraftKind::Existing(open), .. }) if open == id
        );
        if already_open {
            self.set_draft(None);
            return false;
        }
        let Some(user) = self.store.find(id) else {
            return false;
        };
        self.set_draft(Some(Draft {
            kind: DraftKind::Existing(id.clone()),
            record: UserRecord::clone(&user),
        }));
        true
    }

    /// Explicit cancel: closes any open form and drops the selection.
    pub fn cancel(&mut self) {
        self.close_draft();
        if self.store.clear_selection() {
            self.publish(ManagerEvent::SelectionReplaced(self.store.selection()));
        }
    }

    /// Submits the open form: a new draft is created, an existing one is
    /// updated. Without an open form nothing is sent.
    pub async fn save_draft(&mut self, mut record: UserRecord) -> ActionPhase {
        let Some(draft) = self.draft.take() else {
            warn!("users: save requested without an open form");
            return ActionPhase::Idle;
        };
        self.publish(ManagerEvent::DraftChanged(None));
        match draft.kind {
            DraftKind::New => {
                record.id = None;
                self.create_user(record).await
            }
            DraftKind::Existing(id) => {
                record.id = Some(id);
                self.update_user(record).await
            }
        }
    }

    fn close_draft(&mut self) {
        if self.draft.is_some() {
            self.set_draft(None);
        }
    }

    fn set_draft(&mut self, draft: Option<Draft>) {
        self.draft = draft;
        self.publish(ManagerEvent::DraftChanged(self.draft.clone()));
    }

    fn publish_status(&self) {
        self.publish(ManagerEvent::Status(self.status.snapshot()));
    }

    fn publish(&self, event: ManagerEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/manager_tests.rs"]
mod tests;
