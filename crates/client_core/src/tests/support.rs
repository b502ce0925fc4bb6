//! Scripted in-memory directory for orchestration tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use shared::{
    domain::UserId,
    protocol::{UserPage, UserRecord},
};
use tokio::sync::{oneshot, Mutex};

use crate::{
    directory::UserDirectory,
    error::{OperationFailure, OperationOutcome},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ListAll,
    GetOne(UserId),
    Create,
    Update(UserId),
    Remove(UserId),
}

/// Unscripted calls succeed: listing is empty, create assigns `created-1`,
/// update and remove echo, get-one reports a 404.
#[derive(Default)]
pub(crate) struct ScriptedDirectory {
    calls: Mutex<Vec<Call>>,
    list_results: Mutex<VecDeque<OperationOutcome<UserPage>>>,
    get_results: Mutex<HashMap<UserId, OperationOutcome<UserRecord>>>,
    create_result: Mutex<Option<OperationOutcome<UserRecord>>>,
    update_result: Mutex<Option<OperationOutcome<UserRecord>>>,
    remove_failures: Mutex<HashMap<UserId, OperationFailure>>,
    remove_gates: Mutex<HashMap<UserId, oneshot::Receiver<()>>>,
}

pub(crate) fn user(id: &str, username: &str) -> UserRecord {
    UserRecord::with_id(UserId::new(id)).with_field("username", username)
}

pub(crate) fn page(users: Vec<UserRecord>) -> UserPage {
    UserPage {
        total_count: users.len() as u64,
        results: users,
    }
}

pub(crate) fn failure(status: &str, message: &str) -> OperationFailure {
    OperationFailure::new(status, message)
}

impl ScriptedDirectory {
    pub async fn push_list(&self, outcome: OperationOutcome<UserPage>) {
        self.list_results.lock().await.push_back(outcome);
    }

    pub async fn set_get(&self, id: &str, outcome: OperationOutcome<UserRecord>) {
        self.get_results
            .lock()
            .await
            .insert(UserId::new(id), outcome);
    }

    pub async fn set_create(&self, outcome: OperationOutcome<UserRecord>) {
        *self.create_result.lock().await = Some(outcome);
    }

    pub async fn set_update(&self, outcome: OperationOutcome<UserRecord>) {
        *self.update_result.lock().await = Some(outcome);
    }

    pub async fn fail_remove(&self, id: &str, failure: OperationFailure) {
        self.remove_failures
            .lock()
            .await
            .insert(UserId::new(id), failure);
    }

    /// Holds `remove(id)` until the returned sender fires.
    pub async fn gate_remove(&self, id: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.remove_gates.lock().await.insert(UserId::new(id), rx);
        tx
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, wanted: &Call) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| *call == wanted)
            .count()
    }
}

#[async_trait]
impl UserDirectory for ScriptedDirectory {
    async fn list_all(&self) -> OperationOutcome<UserPage> {
        self.calls.lock().await.push(Call::ListAll);
        self.list_results
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| OperationOutcome::Success(UserPage::default()))
    }

    async fn get_one(&self, id: &UserId) -> OperationOutcome<UserRecord> {
        self.calls.lock().await.push(Call::GetOne(id.clone()));
        self.get_results
            .lock()
            .await
            .get(id)
            .cloned()
            .unwrap_or_else(|| OperationOutcome::Failure(failure("404", "Not Found")))
    }

    async fn create(&self, record: &UserRecord) -> OperationOutcome<UserRecord> {
        self.calls.lock().await.push(Call::Create);
        self.create_result.lock().await.clone().unwrap_or_else(|| {
            let mut created = record.clone();
            created.id = Some(UserId::new("created-1"));
            OperationOutcome::Success(created)
        })
    }

    async fn update(&self, record: &UserRecord) -> OperationOutcome<UserRecord> {
        let id = record.id.clone().unwrap_or_else(|| UserId::new(""));
        self.calls.lock().await.push(Call::Update(id));
        self.update_result
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| OperationOutcome::Success(record.clone()))
    }

    async fn remove(&self, id: &UserId) -> OperationOutcome<UserRecord> {
        self.calls.lock().await.push(Call::Remove(id.clone()));
        let gate = self.remove_gates.lock().await.remove(id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match self.remove_failures.lock().await.get(id) {
            Some(failure) => OperationOutcome::Failure(failure.clone()),
            None => OperationOutcome::Success(UserRecord::with_id(id.clone())),
        }
    }
}
