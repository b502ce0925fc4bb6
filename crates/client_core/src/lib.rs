//! Client-side orchestration for a remote user collection: single CRUD
//! calls, best-effort batch deletes, and reconciliation of the local copy
//! with what the server reports.

pub mod batch;
pub mod directory;
pub mod error;
mod manager;
pub mod reconciler;
pub mod status;

pub use batch::{delete_batch, BatchProgress, BatchReport, BatchTerminal, ItemFailure};
pub use directory::{DirectoryClientConfig, HttpUserDirectory, UserDirectory};
pub use error::{ClientError, Operation, OperationFailure, OperationOutcome};
pub use manager::{Draft, DraftKind, ManagerEvent, UserManager};
pub use reconciler::{ReconcileError, SelectionSet, UserCollection, UserStore};
pub use status::{ActionPhase, StatusBoard, StatusSnapshot};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
