//! Canonical local copy of the collection and the selection.
//!
//! Every write installs a fresh `Arc`; nothing reachable from a snapshot
//! handed out earlier is ever modified. Observers detect change with
//! `Arc::ptr_eq`, and entries untouched by a write keep their `Arc`.

use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use shared::{domain::UserId, protocol::UserRecord};
use thiserror::Error;

pub type UserCollection = Arc<[Arc<UserRecord>]>;
pub type SelectionSet = Arc<BTreeSet<UserId>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("user record at position {position} has no identifier")]
    MissingIdentifier { position: usize },
    #[error("duplicate user identifier {0}")]
    DuplicateIdentifier(UserId),
}

#[derive(Debug, Clone)]
pub struct UserStore {
    users: UserCollection,
    selection: SelectionSet,
}

impl Default for UserStore {
    fn default() -> Self {
        Self {
            users: Arc::from(Vec::new()),
            selection: Arc::new(BTreeSet::new()),
        }
    }
}

impl UserStore {
    pub fn users(&self) -> UserCollection {
        Arc::clone(&self.users)
    }

    pub fn selection(&self) -> SelectionSet {
        Arc::clone(&self.selection)
    }

    pub fn find(&self, id: &UserId) -> Option<Arc<UserRecord>> {
        self.users
            .iter()
            .find(|user| user.id.as_ref() == Some(id))
            .cloned()
    }

    /// Swaps in a whole new collection. Rejected input leaves the current
    /// collection in place.
    pub fn replace_all(&mut self, records: Vec<UserRecord>) -> Result<UserCollection, ReconcileError> {
        check_identifiers(&records)?;
        self.users = records.into_iter().map(Arc::new).collect();
        Ok(self.users())
    }

    /// Replaces the entry whose id matches `record` inside a new collection.
    /// Returns false, changing nothing, when no entry matches.
    pub fn replace_one(&mut self, record: UserRecord) -> bool {
        let Some(id) = record.id.as_ref() else {
            return false;
        };
        let Some(position) = self
            .users
            .iter()
            .position(|user| user.id.as_ref() == Some(id))
        else {
            return false;
        };

        let mut next: Vec<Arc<UserRecord>> = self.users.to_vec();
        next[position] = Arc::new(record);
        self.users = Arc::from(next);
        true
    }

    /// Returns whether the selection changed.
    pub fn toggle_selection(&mut self, id: UserId, selected: bool) -> bool {
        if self.selection.contains(&id) == selected {
            return false;
        }
        let mut next = BTreeSet::clone(&self.selection);
        if selected {
            next.insert(id);
        } else {
            next.remove(&id);
        }
        self.selection = Arc::new(next);
        true
    }

    /// Returns whether anything was selected.
    pub fn clear_selection(&mut self) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        self.selection = Arc::new(BTreeSet::new());
        true
    }
}

fn check_identifiers(records: &[UserRecord]) -> Result<(), ReconcileError> {
    let mut seen = HashSet::with_capacity(records.len());
    for (position, record) in records.iter().enumerate() {
        let id = record
            .id
            .as_ref()
            .ok_or(ReconcileError::MissingIdentifier { position })?;
        if !seen.insert(id) {
            return Err(ReconcileError::DuplicateIdentifier(id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
